use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use refrel_types::{ContentSetId, EffectiveTime, RefsetType, ReleaseId};

#[derive(Parser)]
#[command(
    name = "refrel",
    about = "Release workflow for reference sets and translations",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON file holding the repository state
    #[arg(long, global = true, default_value = "refrel-state.json")]
    pub state: PathBuf,

    /// TOML release configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Recorded as the author of every change
    #[arg(long, global = true, default_value = "cli")]
    pub user: String,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a reference set or translation
    Create(CreateArgs),
    /// List content sets and their release state
    List,
    /// Open a release cycle
    Begin(BeginArgs),
    /// Abandon the release in progress
    Cancel(TargetArgs),
    /// Stage a beta copy and generate its artifacts
    Beta(StageArgs),
    /// Stage a preview copy and generate its artifacts
    Preview(StageArgs),
    /// Publish the staged copy
    Publish(TargetArgs),
    /// Show a content set's lifecycle, releases and staging
    Status(TargetArgs),
    /// Member diff between a content set and its staged copy
    Diff(TargetArgs),
    /// List release artifacts, optionally writing them to a directory
    Artifacts(ArtifactsArgs),
    /// Attach a file to an unpublished release record
    Upload(UploadArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    pub name: String,
    /// Identifier shared by the content set and its released copies
    #[arg(long)]
    pub terminology_id: String,
    #[arg(long, default_value = "INT")]
    pub module: String,
    #[arg(long, default_value = "SNOMEDCT")]
    pub terminology: String,
    #[arg(long, default_value = "")]
    pub version: String,
    /// Create a translation in this language instead of a reference set
    #[arg(long)]
    pub language: Option<String>,
    #[arg(long, value_enum, default_value = "extensional")]
    pub refset_type: RefsetTypeArg,
    /// Concept ids to add as members
    #[arg(long = "concept")]
    pub concepts: Vec<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum RefsetTypeArg {
    Extensional,
    Intensional,
    External,
}

impl From<RefsetTypeArg> for RefsetType {
    fn from(arg: RefsetTypeArg) -> Self {
        match arg {
            RefsetTypeArg::Extensional => RefsetType::Extensional,
            RefsetTypeArg::Intensional => RefsetType::Intensional,
            RefsetTypeArg::External => RefsetType::External,
        }
    }
}

#[derive(Args)]
pub struct TargetArgs {
    pub id: ContentSetId,
}

#[derive(Args)]
pub struct BeginArgs {
    pub id: ContentSetId,
    /// Release effective time, YYYYMMDD
    pub effective_time: EffectiveTime,
}

#[derive(Args)]
pub struct StageArgs {
    pub id: ContentSetId,
    /// Export handler id; defaults to the configured handler
    #[arg(long)]
    pub handler: Option<String>,
}

#[derive(Args)]
pub struct ArtifactsArgs {
    pub id: ContentSetId,
    /// Write every artifact payload into this directory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct UploadArgs {
    pub release: ReleaseId,
    pub file: PathBuf,
    /// Artifact name; defaults to the file name
    #[arg(long)]
    pub name: Option<String>,
}

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use refrel_diff::MemberDiffReport;
use refrel_release::{ReleaseConfig, ReleaseManager, StagedRelease};
use refrel_store::{InMemoryRepository, Repository, RepositoryReader};
use refrel_types::{
    Concept, ContentSet, LifecycleState, Member, MemberType, ProjectId, ReleaseRecord,
};

use crate::cli::*;

struct Session {
    manager: ReleaseManager,
    format: OutputFormat,
    user: String,
}

impl Session {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ReleaseConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReleaseConfig::default(),
    };
    let repository = InMemoryRepository::open(&cli.state)
        .with_context(|| format!("opening state {}", cli.state.display()))?;
    debug!(state = %cli.state.display(), "repository opened");

    let session = Session {
        manager: ReleaseManager::new(Arc::new(repository), config)?,
        format: cli.format,
        user: cli.user,
    };

    match cli.command {
        Command::Create(args) => cmd_create(&session, args),
        Command::List => cmd_list(&session),
        Command::Begin(args) => cmd_begin(&session, args),
        Command::Cancel(args) => {
            session.manager.cancel_release(&args.id, &session.user)?;
            println!("{} Release of {} cancelled", "✓".green().bold(), args.id.to_string().cyan());
            Ok(())
        }
        Command::Beta(args) => cmd_stage(&session, args, true),
        Command::Preview(args) => cmd_stage(&session, args, false),
        Command::Publish(args) => cmd_publish(&session, args),
        Command::Status(args) => cmd_status(&session, args),
        Command::Diff(args) => cmd_diff(&session, args),
        Command::Artifacts(args) => cmd_artifacts(&session, args),
        Command::Upload(args) => cmd_upload(&session, args),
    }
}

fn cmd_create(session: &Session, args: CreateArgs) -> anyhow::Result<()> {
    let mut set = match &args.language {
        Some(language) => {
            let mut set = ContentSet::translation(
                &args.terminology_id,
                &args.name,
                language,
                ProjectId::new(),
                &args.module,
            );
            set.concepts = args.concepts.iter().map(|c| Concept::new(c, "")).collect();
            set
        }
        None => {
            let mut set = ContentSet::reference_set(
                &args.terminology_id,
                &args.name,
                args.refset_type.into(),
                ProjectId::new(),
                &args.module,
            );
            set.members = args
                .concepts
                .iter()
                .map(|c| Member::new(c, MemberType::Member))
                .collect();
            set
        }
    };
    set.terminology = args.terminology;
    set.version = args.version;
    set.touch(&session.user);

    let id = set.id;
    let kind = if set.is_translation() { "translation" } else { "reference set" };
    let mut tx = session.manager.repository().begin()?;
    tx.add_content_set(set)?;
    tx.commit()?;

    if session.json() {
        println!("{}", json!({ "id": id.to_string(), "kind": kind }));
    } else {
        println!("{} Created {} {}", "✓".green().bold(), kind, args.name.bold());
        println!("  Id: {}", id.to_string().cyan());
        println!("  Entries: {}", args.concepts.len());
    }
    Ok(())
}

fn cmd_list(session: &Session) -> anyhow::Result<()> {
    let sets = session.manager.repository().content_sets()?;
    let mut rows = Vec::with_capacity(sets.len());
    for set in &sets {
        rows.push((set, session.manager.lifecycle_state(&set.id)?));
    }

    if session.json() {
        let list: Vec<_> = rows
            .iter()
            .map(|(set, state)| {
                json!({
                    "id": set.id.to_string(),
                    "name": set.name,
                    "workflowStatus": set.workflow_status,
                    "lifecycle": state,
                    "staged": set.is_staged(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No content sets.");
    }
    for (set, state) in rows {
        println!(
            "{}  {:<12} {:<24} {}{}",
            set.id.to_string().cyan(),
            lifecycle_label(state),
            set.workflow_status.as_str().dimmed(),
            set.name,
            if set.provisional { " (provisional)".yellow().to_string() } else { String::new() }
        );
    }
    Ok(())
}

fn cmd_begin(session: &Session, args: BeginArgs) -> anyhow::Result<()> {
    let record = session
        .manager
        .begin_release(&args.id, args.effective_time, &session.user)?;
    println!("{} Release {} planned", "✓".green().bold(), record.name.yellow().bold());
    println!("  Effective time: {}", record.effective_time);
    println!("  Record: {}", record.id.to_string().dimmed());
    Ok(())
}

fn cmd_stage(session: &Session, args: StageArgs, beta: bool) -> anyhow::Result<()> {
    let handler = args
        .handler
        .unwrap_or_else(|| session.manager.config().default_export_handler.clone());
    let staged = if beta {
        session.manager.perform_beta(&args.id, &handler, &session.user)?
    } else {
        session.manager.perform_preview(&args.id, &handler, &session.user)?
    };
    print_staged(session, &staged)
}

fn print_staged(session: &Session, staged: &StagedRelease) -> anyhow::Result<()> {
    if session.json() {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "staged": staged.staged.id.to_string(),
                "status": staged.staged.workflow_status,
                "release": artifact_listing(&staged.release),
            }))?
        );
        return Ok(());
    }
    println!(
        "{} Staged {} as {}",
        "✓".green().bold(),
        staged.staged.name.bold(),
        staged.staged.workflow_status.as_str().yellow()
    );
    println!("  Staged copy: {}", staged.staged.id.to_string().cyan());
    print_artifacts(&staged.release);
    Ok(())
}

fn cmd_publish(session: &Session, args: TargetArgs) -> anyhow::Result<()> {
    let record = session.manager.publish(&args.id, &session.user)?;
    if session.json() {
        println!("{}", serde_json::to_string_pretty(&artifact_listing(&record))?);
        return Ok(());
    }
    println!("{} Published {}", "✓".green().bold(), record.name.yellow().bold());
    println!("  Published copy: {}", record.content_set_id.to_string().cyan());
    print_artifacts(&record);
    Ok(())
}

fn cmd_status(session: &Session, args: TargetArgs) -> anyhow::Result<()> {
    let manager = &session.manager;
    let set = manager.content_set(&args.id)?;
    let state = manager.lifecycle_state(&args.id)?;
    let releases = manager.releases(&args.id)?;
    let staged = manager.staged_copy(&args.id)?;

    if session.json() {
        let value = json!({
            "contentSet": set,
            "lifecycle": state,
            "staged": staged.as_ref().map(|s| s.id.to_string()),
            "releases": releases.iter().map(artifact_listing).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} {}", set.name.bold(), format!("[{}]", set.terminology_id).dimmed());
    println!("  Lifecycle: {}", lifecycle_label(state));
    println!("  Workflow status: {}", set.workflow_status.as_str());
    if let Some(staging) = set.staging_type {
        println!("  Staging: {}", staging.as_str().yellow());
    }
    if let Some(copy) = &staged {
        println!("  Staged copy: {}", copy.id.to_string().cyan());
    }
    if set.lookup_in_progress {
        println!("  {}", "Name lookup in progress".yellow());
    }
    if releases.is_empty() {
        println!("  No release records.");
    }
    for record in &releases {
        let tag = if record.published {
            "published".green()
        } else if record.planned {
            "planned".yellow()
        } else {
            "staged".cyan()
        };
        println!("  Release {} ({}) {}", record.name.bold(), record.effective_time, tag);
    }
    Ok(())
}

fn cmd_diff(session: &Session, args: TargetArgs) -> anyhow::Result<()> {
    let report = session.manager.staged_diff(&args.id)?;
    if session.json() {
        let value = json!({ "summary": report.summary(), "report": report });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    if report.is_empty() {
        println!("No member changes.");
        return Ok(());
    }
    print_diff(&report);
    Ok(())
}

fn print_diff(report: &MemberDiffReport) {
    let sections: [(&str, Vec<&Member>); 8] = [
        ("New members", report.new_regular_members()),
        ("Removed members", report.old_regular_members()),
        ("Staged inclusions", report.staged_inclusions()),
        ("Staged exclusions", report.staged_exclusions()),
        ("Valid inclusions", report.valid_inclusions()),
        ("Invalid inclusions", report.invalid_inclusions()),
        ("Valid exclusions", report.valid_exclusions()),
        ("Invalid exclusions", report.invalid_exclusions()),
    ];
    for (title, members) in sections {
        if members.is_empty() {
            continue;
        }
        println!("{} ({})", title.bold(), members.len());
        for member in members {
            let name = member.concept_name.as_deref().unwrap_or("");
            println!("  {} {}", member.concept_id.yellow(), name.dimmed());
        }
    }
}

fn cmd_artifacts(session: &Session, args: ArtifactsArgs) -> anyhow::Result<()> {
    let manager = &session.manager;
    let mut records = manager.releases(&args.id)?;
    if let Some(copy) = manager.staged_copy(&args.id)? {
        records.extend(manager.releases(&copy.id)?);
    }

    if let Some(dir) = &args.out {
        let written = write_artifacts(dir, &records)?;
        println!("{} Wrote {} artifacts to {}", "✓".green().bold(), written, dir.display());
        return Ok(());
    }

    if session.json() {
        let listing: Vec<_> = records.iter().map(artifact_listing).collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }
    if records.iter().all(|r| r.artifacts.is_empty()) {
        println!("No artifacts.");
    }
    for record in &records {
        println!("Release {} {}", record.name.bold(), record.id.to_string().dimmed());
        print_artifacts(record);
    }
    Ok(())
}

fn write_artifacts(dir: &Path, records: &[ReleaseRecord]) -> anyhow::Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut written = 0;
    for artifact in records.iter().flat_map(|r| &r.artifacts) {
        let path = dir.join(&artifact.name);
        fs::write(&path, &artifact.payload)
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

fn cmd_upload(session: &Session, args: UploadArgs) -> anyhow::Result<()> {
    let payload =
        fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let name = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("upload path has no file name")?,
    };
    let artifact = session.manager.upload_artifact(&args.release, &name, payload)?;
    println!(
        "{} Uploaded {} ({} bytes)",
        "✓".green().bold(),
        artifact.name.bold(),
        artifact.size()
    );
    Ok(())
}

fn print_artifacts(record: &ReleaseRecord) {
    for artifact in &record.artifacts {
        let check = if artifact.verify() { "✓".green() } else { "✗".red() };
        println!(
            "  {} {:<18} {:>8} bytes  {}  {}",
            check,
            artifact.kind.label(),
            artifact.size(),
            artifact.checksum[..12.min(artifact.checksum.len())].dimmed(),
            artifact.name
        );
    }
}

fn artifact_listing(record: &ReleaseRecord) -> serde_json::Value {
    json!({
        "id": record.id.to_string(),
        "name": record.name,
        "effectiveTime": record.effective_time,
        "planned": record.planned,
        "published": record.published,
        "artifacts": record.artifacts.iter().map(|a| json!({
            "id": a.id.to_string(),
            "name": a.name,
            "kind": a.kind,
            "size": a.size(),
            "checksum": a.checksum,
        })).collect::<Vec<_>>(),
    })
}

fn lifecycle_label(state: LifecycleState) -> colored::ColoredString {
    let label = state.to_string();
    match state {
        LifecycleState::Unreleased => label.normal(),
        LifecycleState::Planned => label.yellow(),
        LifecycleState::StagedPreview | LifecycleState::StagedBeta => label.cyan(),
        LifecycleState::Published => label.green(),
    }
}

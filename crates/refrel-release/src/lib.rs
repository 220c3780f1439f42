//! Release lifecycle engine for reference sets and translations.
//!
//! A content set moves through `UNRELEASED → PLANNED → STAGED-BETA /
//! STAGED-PREVIEW → PUBLISHED`. [`ReleaseManager`] implements the four
//! transitions (begin, cancel, beta/preview, publish) as all-or-nothing
//! repository transactions, plus migration of a content set to a new
//! code-system version.
//!
//! # Key Types
//!
//! - [`ReleaseManager`] -- Begin, cancel, beta/preview, publish, artifacts, migration
//! - [`ReleaseConfig`] -- Namespace, handler, batch and lookup settings (TOML)
//! - [`NameLookup`] / [`LookupScheduler`] -- Background concept-name refresh
//! - [`TerminologyHandler`] -- Versioned code-system access
//! - [`ProgressReporter`] / [`CancelFlag`] -- Progress and cooperative cancellation
//! - [`MigrationReport`] -- Outcome of a migration reconciliation

pub mod config;
pub mod error;
pub mod lookup;
pub mod manager;
pub mod migration;
pub mod progress;
pub mod terminology;

pub use config::ReleaseConfig;
pub use error::{ReleaseError, ReleaseResult};
pub use lookup::{
    InlineScheduler, LookupHandle, LookupJob, LookupOutcome, LookupScheduler, LookupTask,
    NameLookup, TerminologyNameLookup, TokioScheduler,
};
pub use manager::{ReleaseManager, StagedRelease, PRIOR_WORKFLOW_STATUS};
pub use migration::MigrationReport;
pub use progress::{CancelFlag, ProgressListener, ProgressReporter};
pub use terminology::{InMemoryTerminology, TerminologyConcept, TerminologyHandler};

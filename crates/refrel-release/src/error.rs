//! Error types for the release engine.

use refrel_export::ExportError;
use refrel_staging::StagingError;
use refrel_store::StoreError;

/// Errors that can occur while driving a content set through a release.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// A precondition does not hold. Nothing was changed; the caller may fix
    /// the state and retry.
    #[error("{0}")]
    Validation(String),

    /// A repository invariant is broken.
    #[error("consistency violation: {0}")]
    Consistency(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("unknown export handler: {0}")]
    UnknownExportHandler(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("export error: {0}")]
    Export(#[source] ExportError),

    #[error("terminology error: {0}")]
    Terminology(String),

    /// A long-running operation observed its cancel flag.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReleaseError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns `true` for recoverable precondition failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` when the failure came from a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Store(e) => e.is_conflict(),
            Self::Staging(e) => e.is_conflict(),
            _ => false,
        }
    }
}

impl From<ExportError> for ReleaseError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::UnknownHandler(id) => Self::UnknownExportHandler(id),
            other => Self::Export(other),
        }
    }
}

/// Convenience alias for release results.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

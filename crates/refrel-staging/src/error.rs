//! Error types for staging operations.

use refrel_types::ContentSetId;

/// Errors that can occur while staging or unstaging a content set.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The origin already has a live staged copy.
    #[error("content set {origin} is already staged as {staged}")]
    AlreadyStaged {
        origin: ContentSetId,
        staged: ContentSetId,
    },

    /// The origin has no staged copy to remove.
    #[error("content set {0} is not staged")]
    NotStaged(ContentSetId),

    /// Repository operation failed.
    #[error("store error: {0}")]
    Store(#[from] refrel_store::StoreError),
}

impl StagingError {
    /// Returns `true` when staging lost to an existing or concurrent link.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::AlreadyStaged { .. } => true,
            Self::Store(e) => e.is_conflict(),
            Self::NotStaged(_) => false,
        }
    }
}

/// Convenience alias for staging results.
pub type StagingResult<T> = Result<T, StagingError>;

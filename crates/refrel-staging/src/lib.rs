//! Staging coordinator.
//!
//! Staging creates a structurally independent working copy of a content set
//! (its members and concepts included) under a new identity, and records the
//! pairing in a staged-change link. The origin stays stable for continued use
//! while the copy is exported, reviewed and eventually published or dropped.
//!
//! At most one link may exist per origin. Staging an origin that already has
//! one fails with a conflict; it never overwrites.

pub mod coordinator;
pub mod error;

pub use coordinator::{stage_in, unstage_in, StagingCoordinator};
pub use error::{StagingError, StagingResult};

//! Repository collaborator for the release engine.
//!
//! The release algorithms never touch storage directly. They read through
//! [`RepositoryReader`] and mutate through a [`Transaction`] obtained from
//! [`Repository::begin`]. A transaction is all-or-nothing: dropping it without
//! calling [`Transaction::commit`] discards every change.
//!
//! # Modules
//!
//! - [`error`] -- Error types for repository operations
//! - [`traits`] -- [`RepositoryReader`], [`Transaction`], [`Repository`]
//! - [`state`] -- [`RepositoryState`], the serializable aggregate map
//! - [`memory`] -- [`InMemoryRepository`], optionally persisted as JSON

pub mod error;
pub mod memory;
pub mod state;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryRepository;
pub use state::RepositoryState;
pub use traits::{Repository, RepositoryReader, Transaction};

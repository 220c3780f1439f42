//! Export handlers and delta artifact generation.
//!
//! The release engine is agnostic to on-disk formats. It asks an
//! [`ExportHandler`] (looked up by id in an [`ExportHandlerRegistry`]) to turn
//! rows into bytes and to name the resulting files. The default handler writes
//! RF2 tab-separated files.
//!
//! # Modules
//!
//! - [`handler`] -- [`ExportHandler`] trait and [`Rf2ExportHandler`]
//! - [`registry`] -- [`ExportHandlerRegistry`]
//! - [`delta`] -- Member and translation delta rows against a prior release
//! - [`artifacts`] -- [`ArtifactGenerator`] for snapshot and delta artifacts

pub mod artifacts;
pub mod delta;
pub mod error;
pub mod handler;
pub mod registry;

pub use artifacts::ArtifactGenerator;
pub use delta::{content_set_delta, member_delta, translation_delta};
pub use error::{ExportError, ExportResult};
pub use handler::{ExportHandler, Rf2ExportHandler, DEFAULT_HANDLER_ID};
pub use registry::ExportHandlerRegistry;

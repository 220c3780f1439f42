//! Member diff engine.
//!
//! Intensional reference sets are defined by an expression evaluated against a
//! versioned code system. When the expression is edited, or the code system is
//! migrated, the natural membership changes and every manual inclusion or
//! exclusion recorded against the old membership has to be reconciled against
//! the new one. [`MemberDiffReport`] is that reconciliation. It is a pure
//! derivation over two partitions of a symmetric difference and never
//! mutates its inputs.
//!
//! # Key Types
//!
//! - [`MemberDiffReport`] -- The two input partitions plus classified views
//! - [`DiffSummary`] -- Per-bucket counts for review screens

pub mod report;

pub use report::{DiffSummary, MemberDiffReport};

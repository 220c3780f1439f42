//! Foundation types for reference-set and translation releases.
//!
//! Every other refrel crate depends on `refrel-types`. The aggregates here are
//! plain owned values: a [`ContentSet`] owns its members and concepts, a
//! [`ReleaseRecord`] owns its artifacts. Nothing is lazily loaded.
//!
//! # Key Types
//!
//! - [`ContentSet`] -- A reference set or translation moving through releases
//! - [`Member`] / [`MemberType`] -- One concept inclusion/exclusion record
//! - [`ReleaseRecord`] / [`ReleaseArtifact`] -- Metadata and payloads for one publication cycle
//! - [`StagedChangeLink`] -- Links an origin content set to its staged copy
//! - [`WorkflowStatus`] / [`StagingType`] / [`LifecycleState`] -- Closed status enums
//! - [`EffectiveTime`] -- Release effective date (`YYYYMMDD`)

pub mod content_set;
pub mod error;
pub mod id;
pub mod member;
pub mod release;
pub mod temporal;
pub mod workflow;

pub use content_set::{Concept, ContentSet, ContentSetKind, Description, RefsetType};
pub use error::TypeError;
pub use id::{ArtifactId, ContentSetId, LinkId, MemberId, ProjectId, ReleaseId};
pub use member::{Member, MemberType};
pub use release::{ArtifactKind, ReleaseArtifact, ReleaseProperty, ReleaseRecord, StagedChangeLink};
pub use temporal::EffectiveTime;
pub use workflow::{LifecycleState, StagingType, WorkflowStatus};

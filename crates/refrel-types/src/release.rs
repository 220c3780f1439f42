//! Release records, their artifacts, and staged-change links.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ArtifactId, ContentSetId, LinkId, ReleaseId};
use crate::temporal::EffectiveTime;
use crate::workflow::StagingType;

/// A named property attached to a release record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseProperty {
    pub name: String,
    pub value: String,
}

/// What an artifact contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    Snapshot,
    Delta,
    ActiveSnapshot,
    SimpleRefsetDelta,
    /// Uploaded explicitly by a user.
    Upload,
}

impl ArtifactKind {
    /// Label used when deriving file names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Snapshot => "Snapshot",
            Self::Delta => "Delta",
            Self::ActiveSnapshot => "ActiveSnapshot",
            Self::SimpleRefsetDelta => "SimpleRefsetDelta",
            Self::Upload => "Upload",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A binary payload attached to a release record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArtifact {
    pub id: ArtifactId,
    pub name: String,
    pub kind: ArtifactKind,
    pub payload: Vec<u8>,
    /// Hex BLAKE3 digest of `payload`.
    pub checksum: String,
    pub timestamp: DateTime<Utc>,
}

impl ReleaseArtifact {
    pub fn new(name: impl Into<String>, kind: ArtifactKind, payload: Vec<u8>) -> Self {
        let checksum = hex::encode(blake3::hash(&payload).as_bytes());
        Self {
            id: ArtifactId::new(),
            name: name.into(),
            kind,
            payload,
            checksum,
            timestamp: Utc::now(),
        }
    }

    /// Recompute the digest and compare against the stored checksum.
    pub fn verify(&self) -> bool {
        hex::encode(blake3::hash(&self.payload).as_bytes()) == self.checksum
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

impl fmt::Debug for ReleaseArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseArtifact")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.payload.len())
            .field("checksum", &&self.checksum[..8.min(self.checksum.len())])
            .finish()
    }
}

/// Metadata for one publication cycle of a content set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub id: ReleaseId,
    pub name: String,
    pub description: String,
    pub effective_time: EffectiveTime,
    pub release_begin_date: DateTime<Utc>,
    pub release_finish_date: Option<DateTime<Utc>>,
    pub planned: bool,
    pub published: bool,
    pub content_set_id: ContentSetId,
    pub properties: Vec<ReleaseProperty>,
    pub artifacts: Vec<ReleaseArtifact>,
    pub last_modified_by: String,
}

impl ReleaseRecord {
    /// A planned, unpublished record for the given content set.
    pub fn planned(
        content_set_id: ContentSetId,
        content_set_name: &str,
        effective_time: EffectiveTime,
        user: &str,
    ) -> Self {
        let name = effective_time.release_name();
        Self {
            id: ReleaseId::new(),
            description: format!("{content_set_name} release for {name}"),
            name,
            effective_time,
            release_begin_date: Utc::now(),
            release_finish_date: None,
            planned: true,
            published: false,
            content_set_id,
            properties: Vec::new(),
            artifacts: Vec::new(),
            last_modified_by: user.to_string(),
        }
    }

    /// Clone this record onto another content set under a new id.
    ///
    /// Artifacts are carried forward with fresh ids so the two records never
    /// share an artifact row.
    pub fn clone_onto(&self, content_set_id: ContentSetId) -> Self {
        Self {
            id: ReleaseId::new(),
            content_set_id,
            artifacts: self
                .artifacts
                .iter()
                .map(|a| ReleaseArtifact {
                    id: ArtifactId::new(),
                    ..a.clone()
                })
                .collect(),
            ..self.clone()
        }
    }

    /// Returns `true` for a planned record that has not been published.
    pub fn is_active(&self) -> bool {
        self.planned && !self.published
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Insert or replace a property.
    pub fn set_property(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value,
            None => self.properties.push(ReleaseProperty {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn artifact(&self, id: &ArtifactId) -> Option<&ReleaseArtifact> {
        self.artifacts.iter().find(|a| &a.id == id)
    }
}

/// Links an origin content set to its staged working copy.
///
/// At most one link may exist per origin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedChangeLink {
    pub id: LinkId,
    pub origin_id: ContentSetId,
    pub staged_id: ContentSetId,
    pub staging_type: StagingType,
}

impl StagedChangeLink {
    pub fn new(origin_id: ContentSetId, staged_id: ContentSetId, staging_type: StagingType) -> Self {
        Self {
            id: LinkId::new(),
            origin_id,
            staged_id,
            staging_type,
        }
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Authoring/publication status of a content set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    New,
    Editing,
    Review,
    ReadyForPublication,
    /// A release cycle has begun for this content set.
    Planned,
    Preview,
    Beta,
    Published,
}

impl WorkflowStatus {
    /// Canonical upper-case name, as stored in release properties.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Editing => "EDITING",
            Self::Review => "REVIEW",
            Self::ReadyForPublication => "READY_FOR_PUBLICATION",
            Self::Planned => "PLANNED",
            Self::Preview => "PREVIEW",
            Self::Beta => "BETA",
            Self::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "EDITING" => Ok(Self::Editing),
            "REVIEW" => Ok(Self::Review),
            "READY_FOR_PUBLICATION" => Ok(Self::ReadyForPublication),
            "PLANNED" => Ok(Self::Planned),
            "PREVIEW" => Ok(Self::Preview),
            "BETA" => Ok(Self::Beta),
            "PUBLISHED" => Ok(Self::Published),
            other => Err(TypeError::UnknownVariant {
                kind: "workflow status",
                value: other.to_string(),
            }),
        }
    }
}

/// Why a staged working copy of a content set exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StagingType {
    Beta,
    Preview,
    Migration,
    Definition,
}

impl StagingType {
    /// The workflow status a staged copy must reach before it can be
    /// published. Only release staging types are publishable.
    pub fn target_status(&self) -> Option<WorkflowStatus> {
        match self {
            Self::Beta => Some(WorkflowStatus::Beta),
            Self::Preview => Some(WorkflowStatus::Preview),
            Self::Migration | Self::Definition => None,
        }
    }

    /// Returns `true` for BETA and PREVIEW.
    pub fn is_release(&self) -> bool {
        self.target_status().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beta => "BETA",
            Self::Preview => "PREVIEW",
            Self::Migration => "MIGRATION",
            Self::Definition => "DEFINITION",
        }
    }
}

impl fmt::Display for StagingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a content set currently sits in its release cycle.
///
/// This is derived from the repository (release records and staged-change
/// links), never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Unreleased,
    Planned,
    StagedPreview,
    StagedBeta,
    Published,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unreleased => "UNRELEASED",
            Self::Planned => "PLANNED",
            Self::StagedPreview => "STAGED-PREVIEW",
            Self::StagedBeta => "STAGED-BETA",
            Self::Published => "PUBLISHED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_staging_types_have_targets() {
        assert_eq!(StagingType::Beta.target_status(), Some(WorkflowStatus::Beta));
        assert_eq!(
            StagingType::Preview.target_status(),
            Some(WorkflowStatus::Preview)
        );
        assert!(StagingType::Migration.target_status().is_none());
        assert!(!StagingType::Definition.is_release());
    }

    #[test]
    fn workflow_status_string_roundtrip() {
        for status in [
            WorkflowStatus::New,
            WorkflowStatus::ReadyForPublication,
            WorkflowStatus::Planned,
            WorkflowStatus::Published,
        ] {
            assert_eq!(status.as_str().parse::<WorkflowStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_workflow_status_rejected() {
        let err = "ARCHIVED".parse::<WorkflowStatus>().unwrap_err();
        assert!(matches!(err, TypeError::UnknownVariant { .. }));
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&WorkflowStatus::ReadyForPublication).unwrap();
        assert_eq!(json, "\"READY_FOR_PUBLICATION\"");
    }

    #[test]
    fn lifecycle_display() {
        assert_eq!(LifecycleState::StagedBeta.to_string(), "STAGED-BETA");
    }
}

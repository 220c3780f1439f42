//! Content sets: reference sets and translations.
//!
//! A [`ContentSet`] is an explicit in-memory aggregate. It owns its members
//! (reference sets) or concepts (translations) by value, so copying a content
//! set for staging is a plain deep clone under fresh ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ContentSetId, ProjectId};
use crate::member::Member;
use crate::temporal::EffectiveTime;
use crate::workflow::{StagingType, WorkflowStatus};

/// How a reference set's membership is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefsetType {
    /// Members are listed explicitly.
    Extensional,
    /// Members come from evaluating a definition against a code system.
    Intensional,
    /// Membership is maintained outside this system.
    External,
}

/// The kind-specific part of a content set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentSetKind {
    ReferenceSet {
        refset_type: RefsetType,
        /// Definition clause for intensional sets.
        definition: Option<String>,
    },
    Translation {
        language: String,
    },
}

/// A translated concept owned by a translation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: String,
    pub name: String,
    pub effective_time: Option<EffectiveTime>,
    pub descriptions: Vec<Description>,
}

impl Concept {
    pub fn new(concept_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            concept_id: concept_id.into(),
            name: name.into(),
            effective_time: None,
            descriptions: Vec::new(),
        }
    }

    /// Returns `true` if this concept or any description has no effective
    /// time yet, i.e. it changed since the last release.
    pub fn has_unreleased_changes(&self) -> bool {
        self.effective_time.is_none()
            || self.descriptions.iter().any(|d| d.effective_time.is_none())
    }
}

/// A localized term for a translated concept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub term: String,
    pub language: String,
    pub effective_time: Option<EffectiveTime>,
}

/// A reference set or translation undergoing the release workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSet {
    pub id: ContentSetId,
    /// Identifier shared by an origin and all of its staged/published copies.
    pub terminology_id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: ContentSetKind,
    pub workflow_status: WorkflowStatus,
    pub staging_type: Option<StagingType>,
    pub in_publication_process: bool,
    /// Set on staged copies until they are published.
    pub provisional: bool,
    /// Pollable flag raised while a background name lookup runs.
    pub lookup_in_progress: bool,
    pub project_id: ProjectId,
    pub module_id: String,
    /// Code system the members are drawn from.
    pub terminology: String,
    /// Version of the code system.
    pub version: String,
    /// Effective time of the release this content set belongs to, if any.
    pub effective_time: Option<EffectiveTime>,
    pub members: Vec<Member>,
    pub concepts: Vec<Concept>,
    pub last_modified: DateTime<Utc>,
    pub last_modified_by: String,
}

impl ContentSet {
    /// Create a new, unreleased reference set.
    pub fn reference_set(
        terminology_id: impl Into<String>,
        name: impl Into<String>,
        refset_type: RefsetType,
        project_id: ProjectId,
        module_id: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            terminology_id.into(),
            name.into(),
            ContentSetKind::ReferenceSet {
                refset_type,
                definition: None,
            },
            project_id,
            module_id.into(),
        )
    }

    /// Create a new, unreleased translation.
    pub fn translation(
        terminology_id: impl Into<String>,
        name: impl Into<String>,
        language: impl Into<String>,
        project_id: ProjectId,
        module_id: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            terminology_id.into(),
            name.into(),
            ContentSetKind::Translation {
                language: language.into(),
            },
            project_id,
            module_id.into(),
        )
    }

    fn with_kind(
        terminology_id: String,
        name: String,
        kind: ContentSetKind,
        project_id: ProjectId,
        module_id: String,
    ) -> Self {
        Self {
            id: ContentSetId::new(),
            terminology_id,
            name,
            kind,
            workflow_status: WorkflowStatus::New,
            staging_type: None,
            in_publication_process: false,
            provisional: false,
            lookup_in_progress: false,
            project_id,
            module_id,
            terminology: String::new(),
            version: String::new(),
            effective_time: None,
            members: Vec::new(),
            concepts: Vec::new(),
            last_modified: Utc::now(),
            last_modified_by: String::new(),
        }
    }

    /// Returns `true` while a staged working copy of this content set exists.
    pub fn is_staged(&self) -> bool {
        self.staging_type.is_some()
    }

    pub fn is_translation(&self) -> bool {
        matches!(self.kind, ContentSetKind::Translation { .. })
    }

    /// Active members that put a concept into the set.
    pub fn active_members(&self) -> impl Iterator<Item = &Member> {
        self.members
            .iter()
            .filter(|m| m.active && m.member_type.is_positive())
    }

    /// Record who changed this content set, and when.
    pub fn touch(&mut self, user: &str) {
        self.last_modified = Utc::now();
        self.last_modified_by = user.to_string();
    }

    /// A structurally independent copy under a new identity.
    ///
    /// Members get fresh ids; concepts and descriptions are cloned by value.
    /// Release-cycle flags are not carried over.
    pub fn deep_copy(&self) -> Self {
        Self {
            id: ContentSetId::new(),
            members: self.members.iter().map(Member::duplicate).collect(),
            staging_type: None,
            in_publication_process: false,
            lookup_in_progress: false,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MemberType;

    fn refset() -> ContentSet {
        let mut set = ContentSet::reference_set(
            "450990004",
            "Adverse reactions",
            RefsetType::Extensional,
            ProjectId::new(),
            "731000124108",
        );
        set.members.push(Member::new("100", MemberType::Member));
        set.members.push(Member::new("200", MemberType::Exclusion));
        let mut retired = Member::new("300", MemberType::Member);
        retired.active = false;
        set.members.push(retired);
        set
    }

    #[test]
    fn new_set_is_not_staged() {
        let set = refset();
        assert!(!set.is_staged());
        assert_eq!(set.workflow_status, WorkflowStatus::New);
    }

    #[test]
    fn active_members_skip_exclusions_and_retired() {
        let set = refset();
        let ids: Vec<_> = set.active_members().map(|m| m.concept_id.as_str()).collect();
        assert_eq!(ids, vec!["100"]);
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut origin = refset();
        origin.staging_type = Some(StagingType::Beta);
        origin.in_publication_process = true;

        let mut copy = origin.deep_copy();
        assert_ne!(copy.id, origin.id);
        assert!(!copy.is_staged());
        assert!(!copy.in_publication_process);
        assert_eq!(copy.members.len(), origin.members.len());
        for (a, b) in copy.members.iter().zip(&origin.members) {
            assert_ne!(a.id, b.id);
        }

        copy.members[0].active = false;
        assert!(origin.members[0].active);
    }

    #[test]
    fn translation_changes_detected() {
        let mut concept = Concept::new("100", "Fever");
        concept.effective_time = Some(EffectiveTime::from_ymd(2024, 1, 31).unwrap());
        assert!(!concept.has_unreleased_changes());
        concept.descriptions.push(Description {
            term: "Fiebre".into(),
            language: "es".into(),
            effective_time: None,
        });
        assert!(concept.has_unreleased_changes());
    }

    #[test]
    fn kind_serializes_flattened() {
        let set = ContentSet::translation("es-1", "Spanish", "es", ProjectId::new(), "mod");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["kind"], "TRANSLATION");
        assert_eq!(json["language"], "es");
        let back: ContentSet = serde_json::from_value(json).unwrap();
        assert!(back.is_translation());
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::MemberId;
use crate::temporal::EffectiveTime;

/// How a concept participates in a reference set.
///
/// `Member` rows come from the natural membership (an explicit list, or the
/// evaluation of an intensional definition). `Inclusion`/`Exclusion` are
/// manual overrides against that membership. The `*Staged` variants are
/// overrides recorded against a redefinition that has not been committed yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberType {
    Member,
    Inclusion,
    Exclusion,
    InclusionStaged,
    ExclusionStaged,
}

impl MemberType {
    /// Returns `true` for rows that put a concept into the published set.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Member | Self::Inclusion)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "MEMBER",
            Self::Inclusion => "INCLUSION",
            Self::Exclusion => "EXCLUSION",
            Self::InclusionStaged => "INCLUSION_STAGED",
            Self::ExclusionStaged => "EXCLUSION_STAGED",
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concept record inside a reference set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// Terminology identifier of the referenced concept.
    pub concept_id: String,
    /// Display name, filled in by the background name lookup.
    pub concept_name: Option<String>,
    pub member_type: MemberType,
    pub active: bool,
    pub effective_time: Option<EffectiveTime>,
}

impl Member {
    /// Create an active member with no effective time yet.
    pub fn new(concept_id: impl Into<String>, member_type: MemberType) -> Self {
        Self {
            id: MemberId::new(),
            concept_id: concept_id.into(),
            concept_name: None,
            member_type,
            active: true,
            effective_time: None,
        }
    }

    /// The identity used when comparing two member snapshots.
    pub fn identity(&self) -> (&str, MemberType) {
        (&self.concept_id, self.member_type)
    }

    /// A copy of this member under a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: MemberId::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_member_is_active_without_effective_time() {
        let m = Member::new("100", MemberType::Member);
        assert!(m.active);
        assert!(m.effective_time.is_none());
        assert_eq!(m.identity(), ("100", MemberType::Member));
    }

    #[test]
    fn duplicate_gets_new_id() {
        let m = Member::new("100", MemberType::Inclusion);
        let d = m.duplicate();
        assert_ne!(m.id, d.id);
        assert_eq!(m.identity(), d.identity());
    }

    #[test]
    fn positive_types() {
        assert!(MemberType::Member.is_positive());
        assert!(MemberType::Inclusion.is_positive());
        assert!(!MemberType::Exclusion.is_positive());
        assert!(!MemberType::InclusionStaged.is_positive());
    }
}

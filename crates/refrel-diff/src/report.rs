//! Classification of two member snapshots.
//!
//! | View | Rule |
//! |---|---|
//! | staged inclusions | `new_not_old` INCLUSION / INCLUSION_STAGED |
//! | staged exclusions | `new_not_old` EXCLUSION / EXCLUSION_STAGED |
//! | valid inclusions | old INCLUSION, concept not a new MEMBER / INCLUSION_STAGED |
//! | invalid inclusions | old INCLUSION, concept is a new MEMBER |
//! | valid exclusions | old EXCLUSION, concept is a new MEMBER, not EXCLUSION_STAGED |
//! | invalid exclusions | old EXCLUSION, concept not a new MEMBER |
//! | new regular members | new MEMBER, not EXCLUSION_STAGED, not an old MEMBER |
//! | old regular members | old MEMBER, concept not a new MEMBER / INCLUSION / INCLUSION_STAGED |
//!
//! A concept that is a new MEMBER and also carries a new EXCLUSION_STAGED
//! override lands in neither exclusion bucket.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use refrel_types::{Member, MemberType};

use MemberType::{Exclusion, ExclusionStaged, Inclusion, InclusionStaged};

/// The two halves of a symmetric difference between an old and a new
/// member snapshot, with the reconciliation views derived on demand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDiffReport {
    /// Rows present in the old snapshot only.
    pub old_not_new: Vec<Member>,
    /// Rows present in the new snapshot only.
    pub new_not_old: Vec<Member>,
}

/// Per-bucket counts of a [`MemberDiffReport`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub staged_inclusions: usize,
    pub staged_exclusions: usize,
    pub valid_inclusions: usize,
    pub invalid_inclusions: usize,
    pub valid_exclusions: usize,
    pub invalid_exclusions: usize,
    pub new_regular_members: usize,
    pub old_regular_members: usize,
}

impl MemberDiffReport {
    /// Build a report from already-partitioned halves.
    pub fn new(old_not_new: Vec<Member>, new_not_old: Vec<Member>) -> Self {
        Self {
            old_not_new,
            new_not_old,
        }
    }

    /// Partition two full snapshots by member identity (concept id and
    /// member type) and build a report from the symmetric difference.
    pub fn between(old: &[Member], new: &[Member]) -> Self {
        let old_ids: HashSet<_> = old.iter().map(Member::identity).collect();
        let new_ids: HashSet<_> = new.iter().map(Member::identity).collect();

        Self {
            old_not_new: old
                .iter()
                .filter(|m| !new_ids.contains(&m.identity()))
                .cloned()
                .collect(),
            new_not_old: new
                .iter()
                .filter(|m| !old_ids.contains(&m.identity()))
                .cloned()
                .collect(),
        }
    }

    /// Returns `true` if the two snapshots had identical membership.
    pub fn is_empty(&self) -> bool {
        self.old_not_new.is_empty() && self.new_not_old.is_empty()
    }

    pub fn staged_inclusions(&self) -> Vec<&Member> {
        of_types(&self.new_not_old, &[Inclusion, InclusionStaged]).collect()
    }

    pub fn staged_exclusions(&self) -> Vec<&Member> {
        of_types(&self.new_not_old, &[Exclusion, ExclusionStaged]).collect()
    }

    /// Old inclusions that still add something under the new membership.
    pub fn valid_inclusions(&self) -> Vec<&Member> {
        let covered = self.new_concepts(&[MemberType::Member, InclusionStaged]);
        of_types(&self.old_not_new, &[Inclusion])
            .filter(|m| !covered.contains(m.concept_id.as_str()))
            .collect()
    }

    /// Old inclusions made redundant because the concept is now a natural
    /// member.
    pub fn invalid_inclusions(&self) -> Vec<&Member> {
        let members = self.new_concepts(&[MemberType::Member]);
        of_types(&self.old_not_new, &[Inclusion])
            .filter(|m| members.contains(m.concept_id.as_str()))
            .collect()
    }

    /// Old exclusions that still remove a natural member.
    pub fn valid_exclusions(&self) -> Vec<&Member> {
        let members = self.new_concepts(&[MemberType::Member]);
        let staged = self.new_concepts(&[ExclusionStaged]);
        of_types(&self.old_not_new, &[Exclusion])
            .filter(|m| {
                members.contains(m.concept_id.as_str()) && !staged.contains(m.concept_id.as_str())
            })
            .collect()
    }

    /// Old exclusions whose concept is no longer a natural member.
    pub fn invalid_exclusions(&self) -> Vec<&Member> {
        let members = self.new_concepts(&[MemberType::Member]);
        of_types(&self.old_not_new, &[Exclusion])
            .filter(|m| !members.contains(m.concept_id.as_str()))
            .collect()
    }

    /// Natural members that appear only under the new membership.
    pub fn new_regular_members(&self) -> Vec<&Member> {
        let staged = self.new_concepts(&[ExclusionStaged]);
        let previous: HashSet<&str> = of_types(&self.old_not_new, &[MemberType::Member])
            .map(|m| m.concept_id.as_str())
            .filter(|id| !staged.contains(id))
            .collect();
        of_types(&self.new_not_old, &[MemberType::Member])
            .filter(|m| {
                let id = m.concept_id.as_str();
                !staged.contains(id) && !previous.contains(id)
            })
            .collect()
    }

    /// Natural members that drop out under the new membership.
    pub fn old_regular_members(&self) -> Vec<&Member> {
        let kept = self.new_concepts(&[MemberType::Member, Inclusion, InclusionStaged]);
        of_types(&self.old_not_new, &[MemberType::Member])
            .filter(|m| !kept.contains(m.concept_id.as_str()))
            .collect()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            staged_inclusions: self.staged_inclusions().len(),
            staged_exclusions: self.staged_exclusions().len(),
            valid_inclusions: self.valid_inclusions().len(),
            invalid_inclusions: self.invalid_inclusions().len(),
            valid_exclusions: self.valid_exclusions().len(),
            invalid_exclusions: self.invalid_exclusions().len(),
            new_regular_members: self.new_regular_members().len(),
            old_regular_members: self.old_regular_members().len(),
        }
    }

    fn new_concepts(&self, types: &[MemberType]) -> HashSet<&str> {
        of_types(&self.new_not_old, types)
            .map(|m| m.concept_id.as_str())
            .collect()
    }
}

fn of_types<'a, 't>(
    members: &'a [Member],
    types: &'t [MemberType],
) -> impl Iterator<Item = &'a Member> + 't
where
    'a: 't,
{
    members.iter().filter(move |m| types.contains(&m.member_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m(concept: &str, member_type: MemberType) -> Member {
        Member::new(concept, member_type)
    }

    fn concepts(members: Vec<&Member>) -> Vec<&str> {
        let mut ids: Vec<_> = members.iter().map(|m| m.concept_id.as_str()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn empty_old_yields_all_new_members() {
        let new = vec![
            m("1", MemberType::Member),
            m("2", MemberType::Member),
            m("3", Inclusion),
        ];
        let report = MemberDiffReport::between(&[], &new);
        assert_eq!(concepts(report.new_regular_members()), vec!["1", "2"]);
        assert!(report.old_regular_members().is_empty());
    }

    #[test]
    fn dropped_member_is_old_regular() {
        let old = vec![m("100", MemberType::Member)];
        let report = MemberDiffReport::between(&old, &[]);
        assert_eq!(concepts(report.old_regular_members()), vec!["100"]);
        assert!(report.new_regular_members().is_empty());
    }

    #[test]
    fn dropped_member_kept_by_inclusion_is_not_old_regular() {
        let old = vec![m("100", MemberType::Member)];
        let new = vec![m("100", InclusionStaged)];
        let report = MemberDiffReport::between(&old, &new);
        assert!(report.old_regular_members().is_empty());
        assert_eq!(concepts(report.staged_inclusions()), vec!["100"]);
    }

    #[test]
    fn exclusion_of_new_member_is_valid() {
        let old = vec![m("200", Exclusion)];
        let new = vec![m("200", MemberType::Member)];
        let report = MemberDiffReport::between(&old, &new);
        assert_eq!(concepts(report.valid_exclusions()), vec!["200"]);
        assert!(report.invalid_exclusions().is_empty());
    }

    #[test]
    fn staged_exclusion_leaves_both_exclusion_buckets() {
        let old = vec![m("200", Exclusion)];
        let new = vec![m("200", MemberType::Member), m("200", ExclusionStaged)];
        let report = MemberDiffReport::between(&old, &new);
        assert!(report.valid_exclusions().is_empty());
        assert!(report.invalid_exclusions().is_empty());
        assert_eq!(concepts(report.staged_exclusions()), vec!["200"]);
    }

    #[test]
    fn exclusion_of_non_member_is_invalid() {
        let old = vec![m("300", Exclusion)];
        let report = MemberDiffReport::between(&old, &[]);
        assert_eq!(concepts(report.invalid_exclusions()), vec!["300"]);
    }

    #[test]
    fn inclusion_classification() {
        let old = vec![m("1", Inclusion), m("2", Inclusion), m("3", Inclusion)];
        let new = vec![m("2", MemberType::Member), m("3", InclusionStaged)];
        let report = MemberDiffReport::between(&old, &new);
        assert_eq!(concepts(report.valid_inclusions()), vec!["1"]);
        assert_eq!(concepts(report.invalid_inclusions()), vec!["2"]);
    }

    #[test]
    fn staged_exclusion_suppresses_new_member() {
        let new = vec![m("5", MemberType::Member), m("5", ExclusionStaged)];
        let report = MemberDiffReport::between(&[], &new);
        assert!(report.new_regular_members().is_empty());
    }

    #[test]
    fn identical_snapshots_are_empty() {
        let members = vec![m("1", MemberType::Member), m("2", Exclusion)];
        let report = MemberDiffReport::between(&members, &members);
        assert!(report.is_empty());
        assert_eq!(report.summary(), DiffSummary::default());
    }

    #[test]
    fn identity_ignores_member_id_and_active_flag() {
        let old = vec![m("1", MemberType::Member)];
        let mut renewed = m("1", MemberType::Member);
        renewed.active = false;
        let report = MemberDiffReport::between(&old, &[renewed]);
        assert!(report.is_empty());
    }

    #[test]
    fn summary_counts_buckets() {
        let old = vec![m("1", Inclusion), m("2", Exclusion), m("9", MemberType::Member)];
        let new = vec![m("2", MemberType::Member), m("4", MemberType::Member), m("6", Inclusion)];
        let summary = MemberDiffReport::between(&old, &new).summary();
        assert_eq!(summary.valid_inclusions, 1);
        assert_eq!(summary.valid_exclusions, 1);
        assert_eq!(summary.new_regular_members, 2);
        assert_eq!(summary.old_regular_members, 1);
        assert_eq!(summary.staged_inclusions, 1);
    }

    #[test]
    fn concept_lookup_outlives_type_filter() {
        let new = vec![m("4", MemberType::Member), m("6", Inclusion), m("8", Exclusion)];
        let report = MemberDiffReport::between(&[], &new);

        let found = {
            let types: Vec<MemberType> = vec![MemberType::Member, Inclusion];
            report.new_concepts(&types)
        };
        let mut ids: Vec<_> = found.into_iter().collect();
        ids.sort();
        assert_eq!(ids, vec!["4", "6"]);
    }

    fn member_type() -> impl Strategy<Value = MemberType> {
        prop_oneof![
            Just(MemberType::Member),
            Just(Inclusion),
            Just(Exclusion),
            Just(InclusionStaged),
            Just(ExclusionStaged),
        ]
    }

    fn snapshot() -> impl Strategy<Value = Vec<Member>> {
        prop::collection::vec((0u8..12, member_type()), 0..24)
            .prop_map(|rows| rows.into_iter().map(|(c, t)| m(&c.to_string(), t)).collect())
    }

    proptest! {
        #[test]
        fn concepts_land_in_at_most_one_bucket(old in snapshot(), new in snapshot()) {
            let report = MemberDiffReport::between(&old, &new);

            let valid: HashSet<_> = report.valid_inclusions().iter().map(|m| m.concept_id.clone()).collect();
            let invalid: HashSet<_> = report.invalid_inclusions().iter().map(|m| m.concept_id.clone()).collect();
            prop_assert!(valid.is_disjoint(&invalid));

            let valid: HashSet<_> = report.valid_exclusions().iter().map(|m| m.concept_id.clone()).collect();
            let invalid: HashSet<_> = report.invalid_exclusions().iter().map(|m| m.concept_id.clone()).collect();
            prop_assert!(valid.is_disjoint(&invalid));
        }

        #[test]
        fn empty_old_keeps_every_unsuppressed_member(new in snapshot()) {
            let report = MemberDiffReport::between(&[], &new);
            let suppressed: HashSet<_> = new
                .iter()
                .filter(|m| m.member_type == ExclusionStaged)
                .map(|m| m.concept_id.clone())
                .collect();
            let expected = new
                .iter()
                .filter(|m| m.member_type == MemberType::Member && !suppressed.contains(&m.concept_id))
                .count();
            prop_assert_eq!(report.new_regular_members().len(), expected);
        }
    }
}

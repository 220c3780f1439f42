//! Incremental export rows between a staged content set and the last
//! published release.
//!
//! Rows are keyed only by concept id. A concept that appears under several
//! member types can therefore produce several rows; they are emitted as is.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use refrel_types::{Concept, ContentSet, EffectiveTime, Member, MemberType};

fn is_regular(member: &Member) -> bool {
    matches!(member.member_type, MemberType::Member | MemberType::Inclusion)
}

fn row(source: &Member, active: bool, effective_time: EffectiveTime) -> Member {
    Member {
        active,
        effective_time: Some(effective_time),
        ..source.clone()
    }
}

/// Compute member delta rows. Inactive rows on either side are treated as
/// absent.
///
/// When `same_module` is `false` the old snapshot is ignored entirely: every
/// current MEMBER/INCLUSION row is emitted as active and nothing is retired.
pub fn member_delta(
    current: &[Member],
    previous: &[Member],
    same_module: bool,
    effective_time: EffectiveTime,
) -> Vec<Member> {
    let old: HashMap<&str, &Member> = if same_module {
        previous
            .iter()
            .filter(|m| m.active && m.member_type != MemberType::Exclusion)
            .map(|m| (m.concept_id.as_str(), m))
            .collect()
    } else {
        HashMap::new()
    };

    let mut rows = Vec::new();
    for member in current.iter().filter(|m| m.active) {
        match member.member_type {
            MemberType::Member | MemberType::Inclusion => {
                if !old.contains_key(member.concept_id.as_str()) {
                    rows.push(row(member, true, effective_time));
                }
            }
            MemberType::Exclusion => {
                if let Some(previous) = old.get(member.concept_id.as_str()) {
                    rows.push(row(previous, false, effective_time));
                }
            }
            MemberType::InclusionStaged | MemberType::ExclusionStaged => {}
        }
    }

    if same_module {
        let present: HashSet<&str> = current
            .iter()
            .filter(|m| m.active)
            .map(|m| m.concept_id.as_str())
            .collect();
        rows.extend(
            previous
                .iter()
                .filter(|m| m.active && is_regular(m) && !present.contains(m.concept_id.as_str()))
                .map(|m| row(m, false, effective_time)),
        );
    }

    debug!(
        current = current.len(),
        previous = previous.len(),
        same_module,
        rows = rows.len(),
        "computed member delta"
    );
    rows
}

/// Member delta between two content sets, comparing their module ids.
pub fn content_set_delta(
    current: &ContentSet,
    previous: &ContentSet,
    effective_time: EffectiveTime,
) -> Vec<Member> {
    member_delta(
        &current.members,
        &previous.members,
        current.module_id == previous.module_id,
        effective_time,
    )
}

/// Translation concepts changed since the last release: every concept that
/// has no effective time yet, or owns a description without one. Only the
/// unreleased descriptions are kept.
pub fn translation_delta(current: &ContentSet) -> Vec<Concept> {
    current
        .concepts
        .iter()
        .filter(|c| c.has_unreleased_changes())
        .map(|c| Concept {
            descriptions: c
                .descriptions
                .iter()
                .filter(|d| d.effective_time.is_none())
                .cloned()
                .collect(),
            ..c.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use refrel_types::{Description, ProjectId, RefsetType};

    fn release() -> EffectiveTime {
        EffectiveTime::from_ymd(2025, 7, 31).unwrap()
    }

    fn m(concept: &str, member_type: MemberType) -> Member {
        Member::new(concept, member_type)
    }

    fn summary(rows: &[Member]) -> Vec<(&str, bool)> {
        rows.iter().map(|r| (r.concept_id.as_str(), r.active)).collect()
    }

    #[test]
    fn dropped_member_is_retired() {
        let previous = vec![m("100", MemberType::Member)];
        let rows = member_delta(&[], &previous, true, release());
        assert_eq!(summary(&rows), vec![("100", false)]);
        assert_eq!(rows[0].effective_time, Some(release()));
    }

    #[test]
    fn new_member_is_added() {
        let previous = vec![m("100", MemberType::Member)];
        let current = vec![m("100", MemberType::Member), m("101", MemberType::Inclusion)];
        let rows = member_delta(&current, &previous, true, release());
        assert_eq!(summary(&rows), vec![("101", true)]);
    }

    #[test]
    fn exclusion_retires_row_from_old_member() {
        let mut old_member = m("100", MemberType::Member);
        old_member.concept_name = Some("Asthma".into());
        let previous = vec![old_member.clone()];
        let current = vec![m("100", MemberType::Exclusion)];

        let rows = member_delta(&current, &previous, true, release());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, old_member.id);
        assert_eq!(rows[0].member_type, MemberType::Member);
        assert!(!rows[0].active);
    }

    #[test]
    fn old_exclusions_are_not_in_the_map() {
        let previous = vec![m("100", MemberType::Exclusion)];
        let current = vec![m("100", MemberType::Member)];
        let rows = member_delta(&current, &previous, true, release());
        assert_eq!(summary(&rows), vec![("100", true)]);
    }

    #[test]
    fn module_change_ignores_history() {
        let previous = vec![m("100", MemberType::Member), m("300", MemberType::Member)];
        let current = vec![
            m("100", MemberType::Member),
            m("200", MemberType::Inclusion),
            m("300", MemberType::Exclusion),
        ];
        let rows = member_delta(&current, &previous, false, release());
        assert_eq!(summary(&rows), vec![("100", true), ("200", true)]);
        assert!(rows.iter().all(|r| r.active));
    }

    #[test]
    fn deactivated_member_is_retired_once() {
        let previous = vec![m("100", MemberType::Member), m("101", MemberType::Member)];
        let mut gone = m("101", MemberType::Member);
        gone.active = false;
        let current = vec![m("100", MemberType::Member), gone];

        let rows = member_delta(&current, &previous, true, release());
        assert_eq!(summary(&rows), vec![("101", false)]);

        let mut retired = previous[1].clone();
        retired.active = false;
        let rows = member_delta(&current, &[previous[0].clone(), retired], true, release());
        assert!(rows.is_empty());
    }

    #[test]
    fn reactivated_member_is_added() {
        let mut retired = m("100", MemberType::Member);
        retired.active = false;
        let current = vec![m("100", MemberType::Member)];
        let rows = member_delta(&current, &[retired], true, release());
        assert_eq!(summary(&rows), vec![("100", true)]);
    }

    #[test]
    fn duplicate_concept_rows_are_kept() {
        let current = vec![m("100", MemberType::Member), m("100", MemberType::Inclusion)];
        let rows = member_delta(&current, &[], true, release());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn content_sets_compare_module_ids() {
        let project = ProjectId::new();
        let mut previous =
            ContentSet::reference_set("1", "Set", RefsetType::Extensional, project, "mod-a");
        previous.members.push(m("100", MemberType::Member));
        let mut current = previous.deep_copy();
        current.members.clear();

        assert_eq!(content_set_delta(&current, &previous, release()).len(), 1);
        current.module_id = "mod-b".into();
        assert!(content_set_delta(&current, &previous, release()).is_empty());
    }

    #[test]
    fn translation_delta_keeps_unreleased_rows() {
        let mut set = ContentSet::translation("t1", "Spanish", "es", ProjectId::new(), "mod");
        let released = Some(release());

        let mut unchanged = Concept::new("1", "Asthma");
        unchanged.effective_time = released;
        unchanged.descriptions.push(Description {
            term: "asma".into(),
            language: "es".into(),
            effective_time: released,
        });

        let mut edited = Concept::new("2", "Fever");
        edited.effective_time = released;
        edited.descriptions.push(Description {
            term: "fiebre".into(),
            language: "es".into(),
            effective_time: released,
        });
        edited.descriptions.push(Description {
            term: "calentura".into(),
            language: "es".into(),
            effective_time: None,
        });

        set.concepts = vec![unchanged, edited];
        let delta = translation_delta(&set);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].concept_id, "2");
        assert_eq!(delta[0].descriptions.len(), 1);
        assert_eq!(delta[0].descriptions[0].term, "calentura");
    }
}

//! Migrating a content set to a new code-system version.
//!
//! A migration stages a MIGRATION copy pointed at the new version, checks
//! every staged member against the terminology, deactivates the members that
//! are no longer reachable, and finally either copies the result back onto
//! the origin or drops it. Reconciliation commits in batches of
//! `batch_size` members and can be cancelled between members.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use refrel_diff::MemberDiffReport;
use refrel_staging::{stage_in, unstage_in};
use refrel_store::{Repository, RepositoryReader};
use refrel_types::{ContentSet, ContentSetId, Member, StagingType};

use crate::error::{ReleaseError, ReleaseResult};
use crate::manager::{load, ReleaseManager};
use crate::progress::{CancelFlag, ProgressReporter};
use crate::terminology::TerminologyHandler;

/// Outcome of a migration reconciliation.
#[derive(Clone, Debug, Serialize)]
pub struct MigrationReport {
    /// Members checked against the new version.
    pub checked: usize,
    /// Concepts not reachable in the new version, in member order.
    pub unreachable: Vec<String>,
    /// Active origin members against active reconciled members.
    pub diff: MemberDiffReport,
}

fn active(members: &[Member]) -> Vec<Member> {
    members.iter().filter(|m| m.active).cloned().collect()
}

impl ReleaseManager {
    fn terminology_handler(&self) -> ReleaseResult<Arc<dyn TerminologyHandler>> {
        self.terminology
            .clone()
            .ok_or_else(|| ReleaseError::Config("no terminology handler configured".into()))
    }

    /// Stage a MIGRATION copy of `id` that targets `version`.
    pub fn begin_migration(
        &self,
        id: &ContentSetId,
        version: &str,
        user: &str,
    ) -> ReleaseResult<ContentSet> {
        let mut tx = self.repository.begin()?;
        let mut set = load(tx.as_ref(), id)?;
        if set.is_staged() {
            return Err(ReleaseError::Validation(format!("{} is staged", set.name)));
        }
        if set.in_publication_process {
            return Err(ReleaseError::Validation(format!(
                "{} is in the publication process",
                set.name
            )));
        }

        let mut staged = stage_in(tx.as_mut(), &mut set, StagingType::Migration, None, user)?;
        staged.version = version.to_string();
        tx.update_content_set(&staged)?;
        tx.commit()?;

        info!(
            content_set = %set.id,
            staged = %staged.id,
            from = %set.version,
            to = %version,
            "migration begun"
        );
        Ok(staged)
    }

    /// Check every staged member of `id`'s migration copy against the
    /// terminology and deactivate the unreachable ones.
    ///
    /// Changes are committed every `batch_size` members. On cancellation the
    /// batches already committed stay; the partial batch is discarded.
    pub fn reconcile_migration(
        &self,
        id: &ContentSetId,
        progress: &ProgressReporter,
        cancel: &CancelFlag,
    ) -> ReleaseResult<MigrationReport> {
        let terminology = self.terminology_handler()?;
        let origin = self.content_set(id)?;
        let staged = self.migration_copy(&origin)?;
        let total = staged.members.len();

        let mut unreachable = Vec::new();
        let mut pending: Vec<Member> = Vec::new();
        for (index, member) in staged.members.iter().enumerate() {
            cancel.check()?;

            if !terminology.is_reachable(&member.concept_id, &staged.terminology, &staged.version)? {
                unreachable.push(member.concept_id.clone());
                if member.active {
                    pending.push(Member {
                        active: false,
                        ..member.clone()
                    });
                }
            }

            let done = index + 1;
            if done % self.config.batch_size == 0 {
                self.commit_members(&staged.id, &mut pending)?;
                progress.report_fraction(done, total, "checking members");
            }
        }
        self.commit_members(&staged.id, &mut pending)?;
        progress.report(100, "members checked");

        let reconciled = self.content_set(&staged.id)?;
        let diff = MemberDiffReport::between(&active(&origin.members), &active(&reconciled.members));
        info!(
            content_set = %origin.id,
            checked = total,
            unreachable = unreachable.len(),
            "migration reconciled"
        );
        Ok(MigrationReport {
            checked: total,
            unreachable,
            diff,
        })
    }

    fn commit_members(&self, staged: &ContentSetId, pending: &mut Vec<Member>) -> ReleaseResult<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let mut tx = self.repository.begin()?;
        for member in pending.iter() {
            tx.update_member(staged, member)?;
        }
        tx.commit()?;
        debug!(content_set = %staged, members = pending.len(), "committed migration batch");
        pending.clear();
        Ok(())
    }

    /// Copy the reconciled members and version onto the origin and drop the
    /// migration copy.
    pub fn finish_migration(&self, id: &ContentSetId, user: &str) -> ReleaseResult<ContentSet> {
        let mut tx = self.repository.begin()?;
        let mut set = load(tx.as_ref(), id)?;
        let link = tx
            .staged_link_for_origin(id)?
            .filter(|l| l.staging_type == StagingType::Migration)
            .ok_or_else(|| ReleaseError::Validation(format!("{} is not being migrated", set.name)))?;
        let staged = load(tx.as_ref(), &link.staged_id)?;

        set.members = staged.members.iter().map(Member::duplicate).collect();
        set.version = staged.version.clone();
        unstage_in(tx.as_mut(), &mut set, true, user)?;
        tx.commit()?;

        info!(content_set = %set.id, version = %set.version, "migration finished");
        Ok(set)
    }

    /// Drop the migration copy of `id` without touching the origin's members.
    pub fn cancel_migration(&self, id: &ContentSetId, user: &str) -> ReleaseResult<()> {
        let mut tx = self.repository.begin()?;
        let mut set = load(tx.as_ref(), id)?;
        match tx.staged_link_for_origin(id)? {
            Some(link) if link.staging_type == StagingType::Migration => {}
            _ => {
                return Err(ReleaseError::Validation(format!(
                    "{} is not being migrated",
                    set.name
                )))
            }
        }
        unstage_in(tx.as_mut(), &mut set, true, user)?;
        tx.commit()?;
        info!(content_set = %set.id, "migration cancelled");
        Ok(())
    }

    fn migration_copy(&self, origin: &ContentSet) -> ReleaseResult<ContentSet> {
        let link = self
            .repository
            .staged_link_for_origin(&origin.id)?
            .filter(|l| l.staging_type == StagingType::Migration)
            .ok_or_else(|| {
                ReleaseError::Validation(format!("{} is not being migrated", origin.name))
            })?;
        self.repository
            .content_set(&link.staged_id)?
            .ok_or_else(|| ReleaseError::Consistency(format!("migration copy of {} is missing", origin.name)))
    }
}

//! Creating and removing staged working copies.
//!
//! Both operations come in two forms: `*_in` variants that participate in a
//! caller's [`Transaction`], and methods on [`StagingCoordinator`] that open
//! and commit their own.

use tracing::{debug, info};

use refrel_store::{Repository, Transaction};
use refrel_types::{ContentSet, ContentSetId, EffectiveTime, StagedChangeLink, StagingType};

use crate::error::{StagingError, StagingResult};

/// Stage `origin` inside an open transaction.
///
/// Adds a provisional deep copy of `origin`, marks `origin` with
/// `staging_type`, and creates the staged-change link. `origin` is updated in
/// place and written back through `tx`. Returns the staged copy.
pub fn stage_in(
    tx: &mut dyn Transaction,
    origin: &mut ContentSet,
    staging_type: StagingType,
    effective_time: Option<EffectiveTime>,
    user: &str,
) -> StagingResult<ContentSet> {
    if let Some(link) = tx.staged_link_for_origin(&origin.id)? {
        return Err(StagingError::AlreadyStaged {
            origin: origin.id,
            staged: link.staged_id,
        });
    }

    let mut staged = origin.deep_copy();
    staged.provisional = true;
    if effective_time.is_some() {
        staged.effective_time = effective_time;
    }
    staged.touch(user);
    tx.add_content_set(staged.clone())?;

    origin.staging_type = Some(staging_type);
    origin.in_publication_process = staging_type.is_release();
    origin.touch(user);
    tx.update_content_set(origin)?;

    tx.add_staged_link(StagedChangeLink::new(origin.id, staged.id, staging_type))?;

    debug!(
        origin = %origin.id,
        staged = %staged.id,
        staging_type = %staging_type,
        members = staged.members.len(),
        "staged content set"
    );
    Ok(staged)
}

/// Unstage `origin` inside an open transaction.
///
/// Removes the staged-change link and clears the origin's staging flags.
/// The staged copy itself is removed only when `cascade` is set. Returns the
/// removed link.
pub fn unstage_in(
    tx: &mut dyn Transaction,
    origin: &mut ContentSet,
    cascade: bool,
    user: &str,
) -> StagingResult<StagedChangeLink> {
    let link = tx
        .staged_link_for_origin(&origin.id)?
        .ok_or(StagingError::NotStaged(origin.id))?;
    tx.remove_staged_link(&link.id)?;

    origin.staging_type = None;
    origin.in_publication_process = false;
    origin.touch(user);
    tx.update_content_set(origin)?;

    if cascade {
        let removed = tx.remove_content_set(&link.staged_id)?;
        debug!(
            staged = %removed.id,
            members = removed.members.len(),
            concepts = removed.concepts.len(),
            "removed staged copy"
        );
    }

    debug!(origin = %origin.id, cascade, "unstaged content set");
    Ok(link)
}

/// Staging operations that each run in their own transaction.
pub struct StagingCoordinator<'r> {
    repository: &'r dyn Repository,
}

impl<'r> StagingCoordinator<'r> {
    pub fn new(repository: &'r dyn Repository) -> Self {
        Self { repository }
    }

    /// Stage the content set `origin`. Concurrent calls for the same origin
    /// race to a single winner; every other caller gets a conflict.
    pub fn stage(
        &self,
        origin: &ContentSetId,
        staging_type: StagingType,
        effective_time: Option<EffectiveTime>,
        user: &str,
    ) -> StagingResult<ContentSet> {
        let mut tx = self.repository.begin()?;
        let mut set = tx
            .content_set(origin)?
            .ok_or_else(|| refrel_store::StoreError::NotFound {
                kind: "content set",
                id: origin.to_string(),
            })?;
        let staged = stage_in(tx.as_mut(), &mut set, staging_type, effective_time, user)?;
        tx.commit()?;
        info!(origin = %origin, staged = %staged.id, %staging_type, "content set staged");
        Ok(staged)
    }

    /// Remove the staged-change link of `origin`, and the staged copy when
    /// `cascade` is set.
    pub fn unstage(
        &self,
        origin: &ContentSetId,
        cascade: bool,
        user: &str,
    ) -> StagingResult<StagedChangeLink> {
        let mut tx = self.repository.begin()?;
        let mut set = tx
            .content_set(origin)?
            .ok_or(StagingError::NotStaged(*origin))?;
        let link = unstage_in(tx.as_mut(), &mut set, cascade, user)?;
        tx.commit()?;
        info!(origin = %origin, cascade, "content set unstaged");
        Ok(link)
    }
}

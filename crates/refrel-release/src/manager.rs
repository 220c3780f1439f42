//! The release lifecycle state machine.
//!
//! ```text
//! UNRELEASED --begin--> PLANNED --beta/preview--> STAGED-BETA / STAGED-PREVIEW --publish--> PUBLISHED
//!     ^                    |                              |
//!     +-------cancel-------+---------------cancel---------+
//! ```
//!
//! Every algorithm opens one transaction, checks its preconditions against
//! what that transaction sees, and only then mutates. A precondition failure
//! is a [`ReleaseError::Validation`] and leaves nothing to roll back; any
//! later failure drops the transaction and discards every change.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use refrel_diff::MemberDiffReport;
use refrel_export::{ArtifactGenerator, ExportHandlerRegistry};
use refrel_staging::{stage_in, unstage_in};
use refrel_store::{Repository, RepositoryReader, Transaction};
use refrel_types::{
    ArtifactId, ArtifactKind, ContentSet, ContentSetId, EffectiveTime, LifecycleState,
    ReleaseArtifact, ReleaseId, ReleaseRecord, StagingType, WorkflowStatus,
};

use crate::config::ReleaseConfig;
use crate::error::{ReleaseError, ReleaseResult};
use crate::lookup::{
    InlineScheduler, LookupHandle, LookupScheduler, LookupTask, NameLookup, TokioScheduler,
};
use crate::terminology::TerminologyHandler;

/// Release record property holding the origin's workflow status from before
/// the release began.
pub const PRIOR_WORKFLOW_STATUS: &str = "priorWorkflowStatus";

/// Result of a beta or preview step.
#[derive(Debug)]
pub struct StagedRelease {
    /// The release record attached to the staged copy.
    pub release: ReleaseRecord,
    pub staged: ContentSet,
    /// The name refresh triggered for the staged copy.
    pub lookup: LookupHandle,
}

/// Drives content sets through their release cycle.
pub struct ReleaseManager {
    pub(crate) repository: Arc<dyn Repository>,
    pub(crate) config: ReleaseConfig,
    exporters: ExportHandlerRegistry,
    name_lookup: Option<Arc<dyn NameLookup>>,
    scheduler: Arc<dyn LookupScheduler>,
    pub(crate) terminology: Option<Arc<dyn TerminologyHandler>>,
}

impl ReleaseManager {
    /// Create a manager over `repository`.
    ///
    /// The RF2 export handler is registered by default. When
    /// `lookup_in_background` is set and a tokio runtime is available, name
    /// lookups run on its blocking pool; otherwise they run inline.
    pub fn new(repository: Arc<dyn Repository>, config: ReleaseConfig) -> ReleaseResult<Self> {
        config.validate()?;
        let background = config
            .lookup_in_background
            .then(TokioScheduler::try_current)
            .flatten();
        let scheduler: Arc<dyn LookupScheduler> = match background {
            Some(s) => Arc::new(s),
            None => Arc::new(InlineScheduler),
        };
        Ok(Self {
            repository,
            config,
            exporters: ExportHandlerRegistry::with_defaults(),
            name_lookup: None,
            scheduler,
            terminology: None,
        })
    }

    pub fn with_export_handlers(mut self, exporters: ExportHandlerRegistry) -> Self {
        self.exporters = exporters;
        self
    }

    pub fn with_name_lookup(mut self, lookup: Arc<dyn NameLookup>) -> Self {
        self.name_lookup = Some(lookup);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn LookupScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_terminology(mut self, terminology: Arc<dyn TerminologyHandler>) -> Self {
        self.terminology = Some(terminology);
        self
    }

    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn content_set(&self, id: &ContentSetId) -> ReleaseResult<ContentSet> {
        self.repository
            .content_set(id)?
            .ok_or_else(|| ReleaseError::not_found("content set", id))
    }

    pub fn releases(&self, id: &ContentSetId) -> ReleaseResult<Vec<ReleaseRecord>> {
        Ok(self.repository.releases_for(id)?)
    }

    pub fn staged_copy(&self, id: &ContentSetId) -> ReleaseResult<Option<ContentSet>> {
        Ok(self.repository.staged_copy_of(id)?)
    }

    /// Where `id` sits in its release cycle. An origin and its unpublished
    /// staged copy report the same staged state.
    pub fn lifecycle_state(&self, id: &ContentSetId) -> ReleaseResult<LifecycleState> {
        let set = self.content_set(id)?;
        let records = self.repository.releases_for(&set.id)?;
        let published = records.iter().any(|r| r.published);

        let link = match self.repository.staged_link_for_origin(id)? {
            Some(link) => Some(link),
            None if !published => self.repository.staged_link_for_staged(id)?,
            None => None,
        };
        if let Some(link) = link {
            match link.staging_type {
                StagingType::Beta => return Ok(LifecycleState::StagedBeta),
                StagingType::Preview => return Ok(LifecycleState::StagedPreview),
                StagingType::Migration | StagingType::Definition => {}
            }
        }

        let state = if published {
            LifecycleState::Published
        } else if records.iter().any(|r| r.planned) {
            LifecycleState::Planned
        } else {
            LifecycleState::Unreleased
        };
        Ok(state)
    }

    /// Member diff between `id` and its staged copy, old being the origin.
    pub fn staged_diff(&self, id: &ContentSetId) -> ReleaseResult<MemberDiffReport> {
        let origin = self.content_set(id)?;
        let staged = self
            .staged_copy(id)?
            .ok_or_else(|| ReleaseError::Validation(format!("{} is not staged", origin.name)))?;
        Ok(MemberDiffReport::between(&origin.members, &staged.members))
    }

    // -----------------------------------------------------------------------
    // Begin / cancel
    // -----------------------------------------------------------------------

    /// Open a release cycle for `id` at `effective_time`.
    pub fn begin_release(
        &self,
        id: &ContentSetId,
        effective_time: EffectiveTime,
        user: &str,
    ) -> ReleaseResult<ReleaseRecord> {
        let mut tx = self.repository.begin()?;
        let mut set = load(tx.as_ref(), id)?;

        let records = tx.releases_for(id)?;
        if records.iter().any(|r| r.published) {
            return Err(ReleaseError::Validation(format!(
                "{} is a published release",
                set.name
            )));
        }
        if !records.is_empty() {
            return Err(ReleaseError::Validation(format!(
                "release already in progress for {}",
                set.name
            )));
        }
        if set.is_staged() {
            return Err(ReleaseError::Validation(format!("{} is staged", set.name)));
        }

        let mut record = ReleaseRecord::planned(set.id, &set.name, effective_time, user);
        record.set_property(PRIOR_WORKFLOW_STATUS, set.workflow_status.as_str());
        set.workflow_status = WorkflowStatus::Planned;
        set.in_publication_process = true;
        set.touch(user);
        tx.update_content_set(&set)?;
        tx.add_release(record.clone())?;
        tx.commit()?;

        info!(
            content_set = %set.id,
            release = %record.id,
            effective_time = %effective_time,
            "release begun"
        );
        Ok(record)
    }

    /// Abandon the release cycle of `id`, dropping any staged copy.
    pub fn cancel_release(&self, id: &ContentSetId, user: &str) -> ReleaseResult<()> {
        let mut tx = self.repository.begin()?;
        let mut set = load(tx.as_ref(), id)?;

        let records = tx.releases_for(id)?;
        let record = match records.as_slice() {
            [record] if record.is_active() => record.clone(),
            _ => {
                return Err(ReleaseError::Validation(format!(
                    "no release in progress for {}",
                    set.name
                )))
            }
        };
        let link = tx.staged_link_for_origin(id)?;
        if let Some(link) = &link {
            if !link.staging_type.is_release() {
                return Err(ReleaseError::Validation(format!(
                    "{} is staged for {}",
                    set.name, link.staging_type
                )));
            }
        }

        tx.remove_release(&record.id)?;
        restore_prior_status(&mut set, &record);
        match link {
            Some(link) => {
                let staged_release = tx
                    .releases_for(&link.staged_id)?
                    .into_iter()
                    .find(|r| !r.published)
                    .ok_or_else(|| {
                        ReleaseError::Consistency(format!(
                            "cannot find release record for staged copy of {}",
                            set.name
                        ))
                    })?;
                tx.remove_release(&staged_release.id)?;
                unstage_in(tx.as_mut(), &mut set, true, user)?;
                debug!(staged = %link.staged_id, "staged copy removed");
            }
            None => {
                set.in_publication_process = false;
                set.touch(user);
                tx.update_content_set(&set)?;
            }
        }
        tx.commit()?;

        info!(content_set = %set.id, release = %record.id, "release cancelled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Beta / preview
    // -----------------------------------------------------------------------

    pub fn perform_beta(
        &self,
        id: &ContentSetId,
        export_handler: &str,
        user: &str,
    ) -> ReleaseResult<StagedRelease> {
        self.perform_staging(id, StagingType::Beta, export_handler, user)
    }

    pub fn perform_preview(
        &self,
        id: &ContentSetId,
        export_handler: &str,
        user: &str,
    ) -> ReleaseResult<StagedRelease> {
        self.perform_staging(id, StagingType::Preview, export_handler, user)
    }

    fn perform_staging(
        &self,
        id: &ContentSetId,
        staging_type: StagingType,
        export_handler: &str,
        user: &str,
    ) -> ReleaseResult<StagedRelease> {
        let handler = self.exporters.get(export_handler)?;
        let target_status = staging_type.target_status().ok_or_else(|| {
            ReleaseError::Validation(format!("{staging_type} is not a release staging type"))
        })?;

        let mut tx = self.repository.begin()?;
        let mut set = load(tx.as_ref(), id)?;

        let active: Vec<ReleaseRecord> = tx
            .releases_for(id)?
            .into_iter()
            .filter(ReleaseRecord::is_active)
            .collect();
        let record = match active.as_slice() {
            [record] => record.clone(),
            _ => {
                return Err(ReleaseError::Validation(format!(
                    "{} is not ready to {}",
                    set.name,
                    staging_type.as_str().to_lowercase()
                )))
            }
        };
        if set.is_staged() {
            return Err(ReleaseError::Validation(format!("{} is staged", set.name)));
        }

        let effective_time = record.effective_time;
        let mut staged = stage_in(tx.as_mut(), &mut set, staging_type, Some(effective_time), user)?;
        let mut staged_record = record.clone_onto(staged.id);
        staged_record.last_modified_by = user.to_string();

        let generator = ArtifactGenerator::new(
            handler.as_ref(),
            &self.config.namespace,
            effective_time,
            staging_type == StagingType::Beta,
        );
        staged_record.artifacts.push(generator.snapshot(&staged)?);

        let prior = tx
            .published_releases(&set.terminology_id, &set.project_id)?
            .into_iter()
            .last();
        match prior {
            Some(prior) => {
                let previous = tx.content_set(&prior.content_set_id)?.ok_or_else(|| {
                    ReleaseError::Consistency(format!(
                        "published release {} has no content set",
                        prior.id
                    ))
                })?;
                staged_record.artifacts.push(generator.delta(&staged, &previous)?);
                debug!(prior = %prior.id, "delta generated against prior release");
            }
            None => debug!(content_set = %set.id, "no prior published release; delta skipped"),
        }

        staged.workflow_status = target_status;
        staged.touch(user);
        tx.update_content_set(&staged)?;

        set.lookup_in_progress = self.name_lookup.is_some();
        tx.update_content_set(&set)?;

        staged_record.planned = false;
        tx.add_release(staged_record.clone())?;
        tx.commit()?;

        info!(
            content_set = %set.id,
            staged = %staged.id,
            release = %staged_record.id,
            %staging_type,
            artifacts = staged_record.artifacts.len(),
            "content set staged for release"
        );

        let lookup = self.schedule_lookup(set.id, staged.id);
        Ok(StagedRelease {
            release: staged_record,
            staged,
            lookup,
        })
    }

    fn schedule_lookup(&self, flagged: ContentSetId, target: ContentSetId) -> LookupHandle {
        let Some(lookup) = &self.name_lookup else {
            return LookupHandle::Skipped;
        };
        let task = LookupTask::new(
            Arc::clone(&self.repository),
            Arc::clone(lookup),
            flagged,
            target,
            self.config.lookup_batch_size,
            self.config.lookup_retries,
        );
        self.scheduler.schedule(Box::new(move || {
            task.run();
        }))
    }

    // -----------------------------------------------------------------------
    // Publish
    // -----------------------------------------------------------------------

    /// Publish the staged copy of `id`. Returns the published release record.
    pub fn publish(&self, id: &ContentSetId, user: &str) -> ReleaseResult<ReleaseRecord> {
        let mut tx = self.repository.begin()?;
        let mut set = load(tx.as_ref(), id)?;

        let not_ready = || ReleaseError::Validation(format!("{} is not ready to publish", set.name));
        if !set.is_staged() {
            return Err(not_ready());
        }
        let link = tx.staged_link_for_origin(id)?.ok_or_else(|| {
            ReleaseError::Consistency(format!("{} is staged without a staged copy", set.name))
        })?;
        let mut staged = tx.content_set(&link.staged_id)?.ok_or_else(|| {
            ReleaseError::Consistency(format!("staged copy of {} is missing", set.name))
        })?;
        match link.staging_type.target_status() {
            Some(target) if staged.workflow_status == target => {}
            _ => return Err(not_ready()),
        }
        let record = tx
            .releases_for(id)?
            .into_iter()
            .find(ReleaseRecord::is_active)
            .ok_or_else(|| {
                ReleaseError::Consistency(format!("cannot find release record for {}", set.name))
            })?;
        let mut staged_record = tx
            .releases_for(&staged.id)?
            .into_iter()
            .find(|r| !r.published)
            .ok_or_else(|| {
                ReleaseError::Consistency(format!("cannot find release record for {}", staged.name))
            })?;

        restore_prior_status(&mut set, &record);
        unstage_in(tx.as_mut(), &mut set, false, user)?;
        tx.remove_release(&record.id)?;

        let effective_time = staged_record.effective_time;
        staged.workflow_status = WorkflowStatus::Published;
        staged.provisional = false;
        staged.effective_time = Some(effective_time);
        if staged.is_translation() {
            backfill_effective_times(&mut staged, effective_time);
        }
        staged.touch(user);
        tx.update_content_set(&staged)?;

        staged_record.published = true;
        staged_record.planned = false;
        staged_record.release_finish_date = Some(Utc::now());
        staged_record.last_modified_by = user.to_string();
        tx.update_release(&staged_record)?;
        tx.commit()?;

        info!(
            content_set = %set.id,
            published = %staged.id,
            release = %staged_record.id,
            "release published"
        );
        Ok(staged_record)
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Attach an uploaded file to an unpublished release record.
    pub fn upload_artifact(
        &self,
        release: &ReleaseId,
        name: &str,
        payload: Vec<u8>,
    ) -> ReleaseResult<ReleaseArtifact> {
        let mut tx = self.repository.begin()?;
        let record = mutable_release(tx.as_ref(), release)?;

        let artifact = ReleaseArtifact::new(name, ArtifactKind::Upload, payload);
        tx.add_artifact(&record.id, artifact.clone())?;
        tx.commit()?;

        debug!(release = %release, artifact = %artifact.id, bytes = artifact.size(), "artifact uploaded");
        Ok(artifact)
    }

    /// Detach an artifact from an unpublished release record.
    pub fn remove_artifact(
        &self,
        release: &ReleaseId,
        artifact: &ArtifactId,
    ) -> ReleaseResult<ReleaseArtifact> {
        let mut tx = self.repository.begin()?;
        let record = mutable_release(tx.as_ref(), release)?;
        if record.artifact(artifact).is_none() {
            return Err(ReleaseError::not_found("artifact", artifact));
        }

        let removed = tx.remove_artifact(release, artifact)?;
        tx.commit()?;
        debug!(release = %release, artifact = %artifact, "artifact removed");
        Ok(removed)
    }
}

pub(crate) fn load(tx: &dyn Transaction, id: &ContentSetId) -> ReleaseResult<ContentSet> {
    tx.content_set(id)?
        .ok_or_else(|| ReleaseError::not_found("content set", id))
}

fn mutable_release(tx: &dyn Transaction, id: &ReleaseId) -> ReleaseResult<ReleaseRecord> {
    let record = tx
        .release(id)?
        .ok_or_else(|| ReleaseError::not_found("release record", id))?;
    if record.published {
        return Err(ReleaseError::Validation(format!(
            "release {} is published; its artifacts cannot change",
            record.name
        )));
    }
    Ok(record)
}

fn restore_prior_status(set: &mut ContentSet, record: &ReleaseRecord) {
    match record.property(PRIOR_WORKFLOW_STATUS).map(str::parse::<WorkflowStatus>) {
        Some(Ok(status)) => set.workflow_status = status,
        Some(Err(e)) => warn!(content_set = %set.id, error = %e, "unreadable prior workflow status"),
        None => {}
    }
}

fn backfill_effective_times(set: &mut ContentSet, effective_time: EffectiveTime) {
    for concept in &mut set.concepts {
        concept.effective_time = concept.effective_time.or(Some(effective_time));
        for description in &mut concept.descriptions {
            description.effective_time = description.effective_time.or(Some(effective_time));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refrel_store::InMemoryRepository;
    use refrel_types::{Member, MemberType, ProjectId, RefsetType};

    fn effective(month: u32) -> EffectiveTime {
        EffectiveTime::from_ymd(2025, month, 1).unwrap()
    }

    fn setup() -> (ReleaseManager, ContentSetId) {
        let repo = Arc::new(InMemoryRepository::new());
        let mut set = ContentSet::reference_set(
            "450990004",
            "Adverse reactions",
            RefsetType::Extensional,
            ProjectId::new(),
            "mod",
        );
        set.members.push(Member::new("100", MemberType::Member));
        let id = set.id;
        let mut tx = repo.begin().unwrap();
        tx.add_content_set(set).unwrap();
        tx.commit().unwrap();

        let config = ReleaseConfig {
            lookup_in_background: false,
            ..ReleaseConfig::default()
        };
        (ReleaseManager::new(repo, config).unwrap(), id)
    }

    #[test]
    fn invalid_config_rejected() {
        let config = ReleaseConfig {
            batch_size: 0,
            ..ReleaseConfig::default()
        };
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        assert!(matches!(
            ReleaseManager::new(repo, config),
            Err(ReleaseError::Config(_))
        ));
    }

    #[test]
    fn begin_records_prior_status() {
        let (manager, id) = setup();
        let record = manager.begin_release(&id, effective(1), "author").unwrap();
        assert_eq!(record.name, "20250101");
        assert_eq!(record.property(PRIOR_WORKFLOW_STATUS), Some("NEW"));
        assert!(record.is_active());

        let set = manager.content_set(&id).unwrap();
        assert_eq!(set.workflow_status, WorkflowStatus::Planned);
        assert!(set.in_publication_process);
        assert!(!set.is_staged());
        assert_eq!(set.last_modified_by, "author");
        assert_eq!(manager.lifecycle_state(&id).unwrap(), LifecycleState::Planned);
    }

    #[test]
    fn begin_twice_is_rejected() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        let err = manager.begin_release(&id, effective(2), "u").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(manager.releases(&id).unwrap().len(), 1);
    }

    #[test]
    fn unknown_export_handler_rejected_before_mutation() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        let err = manager.perform_beta(&id, "CSV", "u").unwrap_err();
        assert!(matches!(err, ReleaseError::UnknownExportHandler(h) if h == "CSV"));
        assert!(manager.staged_copy(&id).unwrap().is_none());
    }

    #[test]
    fn beta_without_release_is_not_ready() {
        let (manager, id) = setup();
        let err = manager.perform_beta(&id, "DEFAULT", "u").unwrap_err();
        assert!(matches!(&err, ReleaseError::Validation(m) if m.contains("not ready to beta")));
    }

    #[test]
    fn beta_twice_is_rejected_as_staged() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        manager.perform_beta(&id, "DEFAULT", "u").unwrap();
        let err = manager.perform_preview(&id, "DEFAULT", "u").unwrap_err();
        assert!(matches!(&err, ReleaseError::Validation(m) if m.ends_with("is staged")));
    }

    #[test]
    fn beta_attaches_snapshot_without_prior_release() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        let staged = manager.perform_beta(&id, "DEFAULT", "u").unwrap();

        assert!(!staged.release.planned);
        assert!(!staged.release.published);
        assert_eq!(staged.release.artifacts.len(), 1);
        assert_eq!(staged.release.artifacts[0].kind, ArtifactKind::ActiveSnapshot);
        assert!(staged.release.artifacts[0].name.starts_with('x'));
        assert_eq!(staged.staged.workflow_status, WorkflowStatus::Beta);
        assert!(matches!(staged.lookup, LookupHandle::Skipped));
        assert_eq!(manager.lifecycle_state(&id).unwrap(), LifecycleState::StagedBeta);
    }

    #[test]
    fn staged_copy_reports_origin_stage() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        let staged = manager.perform_preview(&id, "DEFAULT", "u").unwrap();
        assert_eq!(
            manager.lifecycle_state(&staged.staged.id).unwrap(),
            LifecycleState::StagedPreview
        );

        manager.publish(&id, "u").unwrap();
        assert_eq!(
            manager.lifecycle_state(&staged.staged.id).unwrap(),
            LifecycleState::Published
        );
    }

    #[test]
    fn preview_artifacts_are_not_prefixed() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        let staged = manager.perform_preview(&id, "DEFAULT", "u").unwrap();
        assert!(staged.release.artifacts[0].name.starts_with("der2_"));
        assert_eq!(manager.lifecycle_state(&id).unwrap(), LifecycleState::StagedPreview);
    }

    #[test]
    fn publish_requires_staging() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        let err = manager.publish(&id, "u").unwrap_err();
        assert!(matches!(&err, ReleaseError::Validation(m) if m.contains("not ready to publish")));
    }

    #[test]
    fn uploads_are_rejected_on_published_records() {
        let (manager, id) = setup();
        let planned = manager.begin_release(&id, effective(1), "u").unwrap();
        let upload = manager
            .upload_artifact(&planned.id, "notes.txt", b"release notes".to_vec())
            .unwrap();
        assert!(upload.verify());

        let staged = manager.perform_beta(&id, "DEFAULT", "u").unwrap();
        // Uploads on the planned record are carried onto the staged record.
        assert!(staged.release.artifacts.iter().any(|a| a.name == "notes.txt"));

        let published = manager.publish(&id, "u").unwrap();
        let err = manager
            .upload_artifact(&published.id, "late.txt", vec![1])
            .unwrap_err();
        assert!(err.is_validation());
        let err = manager
            .remove_artifact(&published.id, &published.artifacts[0].id)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn remove_unknown_artifact_is_not_found() {
        let (manager, id) = setup();
        let planned = manager.begin_release(&id, effective(1), "u").unwrap();
        let err = manager
            .remove_artifact(&planned.id, &ArtifactId::new())
            .unwrap_err();
        assert!(matches!(err, ReleaseError::NotFound { kind: "artifact", .. }));
    }

    #[test]
    fn staged_diff_compares_origin_and_copy() {
        let (manager, id) = setup();
        manager.begin_release(&id, effective(1), "u").unwrap();
        manager.perform_beta(&id, "DEFAULT", "u").unwrap();
        assert!(manager.staged_diff(&id).unwrap().is_empty());
    }
}

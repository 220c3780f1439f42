//! Background member-name refresh.
//!
//! After a beta or preview step the staged copy's concept names are
//! refreshed from the terminology. The refresh never fails the step that
//! triggered it: errors are retried, then logged, and the origin's
//! `lookup_in_progress` flag is always cleared by the task itself.
//!
//! Where the task runs is decided by a caller-supplied [`LookupScheduler`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use refrel_store::{Repository, RepositoryReader};
use refrel_types::{ContentSet, ContentSetId};

use crate::error::ReleaseResult;
use crate::terminology::TerminologyHandler;

/// Resolves display names for concepts.
pub trait NameLookup: Send + Sync {
    /// Names for as many of `concept_ids` as can be resolved, keyed by id.
    fn lookup_names(
        &self,
        content_set: &ContentSet,
        concept_ids: &[String],
    ) -> ReleaseResult<HashMap<String, String>>;
}

/// [`NameLookup`] over a [`TerminologyHandler`], using the content set's own
/// terminology and version.
pub struct TerminologyNameLookup {
    terminology: Arc<dyn TerminologyHandler>,
}

impl TerminologyNameLookup {
    pub fn new(terminology: Arc<dyn TerminologyHandler>) -> Self {
        Self { terminology }
    }
}

impl NameLookup for TerminologyNameLookup {
    fn lookup_names(
        &self,
        content_set: &ContentSet,
        concept_ids: &[String],
    ) -> ReleaseResult<HashMap<String, String>> {
        let mut names = HashMap::with_capacity(concept_ids.len());
        for id in concept_ids {
            let concept =
                self.terminology
                    .get_concept(id, &content_set.terminology, &content_set.version)?;
            if let Some(concept) = concept {
                names.insert(id.clone(), concept.name);
            }
        }
        Ok(names)
    }
}

/// A unit of background work.
pub type LookupJob = Box<dyn FnOnce() + Send + 'static>;

/// Decides where a lookup job runs.
pub trait LookupScheduler: Send + Sync {
    fn schedule(&self, job: LookupJob) -> LookupHandle;
}

/// Runs the job on the calling thread before returning.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineScheduler;

impl LookupScheduler for InlineScheduler {
    fn schedule(&self, job: LookupJob) -> LookupHandle {
        job();
        LookupHandle::Completed
    }
}

/// Runs the job on a tokio runtime's blocking pool.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// A scheduler on the runtime of the current context, if there is one.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl LookupScheduler for TokioScheduler {
    fn schedule(&self, job: LookupJob) -> LookupHandle {
        LookupHandle::Running(self.handle.spawn_blocking(job))
    }
}

/// Handle on a scheduled lookup.
pub enum LookupHandle {
    /// No lookup was scheduled.
    Skipped,
    /// The lookup already ran to completion.
    Completed,
    Running(JoinHandle<()>),
}

impl LookupHandle {
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Skipped | Self::Completed => true,
            Self::Running(handle) => handle.is_finished(),
        }
    }

    /// Wait for a running lookup. A panicked task is logged, not propagated.
    pub async fn wait(self) {
        if let Self::Running(handle) = self {
            if let Err(e) = handle.await {
                error!(error = %e, "name lookup task failed");
            }
        }
    }
}

impl fmt::Debug for LookupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => f.write_str("LookupHandle::Skipped"),
            Self::Completed => f.write_str("LookupHandle::Completed"),
            Self::Running(h) => write!(f, "LookupHandle::Running(finished: {})", h.is_finished()),
        }
    }
}

/// How a lookup task ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Every batch was applied.
    Completed { resolved: usize },
    /// The staged copy disappeared while the task ran.
    Abandoned,
    /// A batch kept failing after all retries.
    GaveUp,
}

/// Refreshes concept names on `target` and clears the lookup flag on
/// `flagged` when done.
pub struct LookupTask {
    repository: Arc<dyn Repository>,
    lookup: Arc<dyn NameLookup>,
    flagged: ContentSetId,
    target: ContentSetId,
    batch_size: usize,
    retries: u32,
}

impl LookupTask {
    pub fn new(
        repository: Arc<dyn Repository>,
        lookup: Arc<dyn NameLookup>,
        flagged: ContentSetId,
        target: ContentSetId,
        batch_size: usize,
        retries: u32,
    ) -> Self {
        Self {
            repository,
            lookup,
            flagged,
            target,
            batch_size: batch_size.max(1),
            retries,
        }
    }

    pub fn run(self) -> LookupOutcome {
        let outcome = self.refresh();
        self.clear_flag();
        match outcome {
            LookupOutcome::Completed { resolved } => {
                info!(content_set = %self.target, resolved, "name lookup finished")
            }
            LookupOutcome::Abandoned => {
                debug!(content_set = %self.target, "staged copy gone; name lookup abandoned")
            }
            LookupOutcome::GaveUp => {
                error!(content_set = %self.target, retries = self.retries, "name lookup gave up")
            }
        }
        outcome
    }

    fn refresh(&self) -> LookupOutcome {
        let target = match self.repository.content_set(&self.target) {
            Ok(Some(set)) => set,
            Ok(None) => return LookupOutcome::Abandoned,
            Err(e) => {
                warn!(content_set = %self.target, error = %e, "cannot load staged copy for name lookup");
                return LookupOutcome::GaveUp;
            }
        };

        let mut ids: Vec<String> = if target.is_translation() {
            target.concepts.iter().map(|c| c.concept_id.clone()).collect()
        } else {
            target.members.iter().map(|m| m.concept_id.clone()).collect()
        };
        ids.sort();
        ids.dedup();

        let mut resolved = 0;
        for (batch, chunk) in ids.chunks(self.batch_size).enumerate() {
            let mut attempt = 0;
            loop {
                match self.apply_batch(chunk) {
                    Ok(Some(n)) => {
                        resolved += n;
                        break;
                    }
                    Ok(None) => return LookupOutcome::Abandoned,
                    Err(e) if attempt < self.retries => {
                        attempt += 1;
                        warn!(
                            content_set = %self.target,
                            batch,
                            attempt,
                            error = %e,
                            "name lookup batch failed; retrying"
                        );
                    }
                    Err(e) => {
                        warn!(content_set = %self.target, batch, error = %e, "name lookup batch failed");
                        return LookupOutcome::GaveUp;
                    }
                }
            }
        }
        LookupOutcome::Completed { resolved }
    }

    /// Resolve one batch and commit it. `None` means the target is gone.
    fn apply_batch(&self, concept_ids: &[String]) -> ReleaseResult<Option<usize>> {
        let Some(current) = self.repository.content_set(&self.target)? else {
            return Ok(None);
        };
        let names = self.lookup.lookup_names(&current, concept_ids)?;

        let mut tx = self.repository.begin()?;
        let Some(mut set) = tx.content_set(&self.target)? else {
            return Ok(None);
        };
        let mut updated = 0;
        for member in &mut set.members {
            if let Some(name) = names.get(&member.concept_id) {
                member.concept_name = Some(name.clone());
                updated += 1;
            }
        }
        for concept in &mut set.concepts {
            if let Some(name) = names.get(&concept.concept_id) {
                concept.name = name.clone();
                updated += 1;
            }
        }
        tx.update_content_set(&set)?;
        tx.commit()?;
        debug!(content_set = %self.target, requested = concept_ids.len(), updated, "applied name batch");
        Ok(Some(updated))
    }

    fn clear_flag(&self) {
        for attempt in 0..=self.retries {
            match self.try_clear_flag() {
                Ok(()) => return,
                Err(e) => warn!(content_set = %self.flagged, attempt, error = %e, "failed to clear lookup flag"),
            }
        }
        error!(content_set = %self.flagged, "lookup flag left set");
    }

    fn try_clear_flag(&self) -> ReleaseResult<()> {
        let mut tx = self.repository.begin()?;
        if let Some(mut set) = tx.content_set(&self.flagged)? {
            if set.lookup_in_progress {
                set.lookup_in_progress = false;
                tx.update_content_set(&set)?;
                tx.commit()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::ReleaseError;
    use crate::terminology::{InMemoryTerminology, TerminologyConcept};
    use refrel_store::{InMemoryRepository, RepositoryReader};
    use refrel_types::{Member, MemberType, ProjectId, RefsetType};

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        origin: ContentSetId,
        staged: ContentSetId,
    }

    fn fixture(concepts: &[&str]) -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let mut origin = ContentSet::reference_set(
            "450990004",
            "Adverse reactions",
            RefsetType::Extensional,
            ProjectId::new(),
            "mod",
        );
        origin.terminology = "SNOMEDCT".into();
        origin.version = "2025-01-31".into();
        for id in concepts {
            origin.members.push(Member::new(*id, MemberType::Member));
        }
        let mut staged = origin.deep_copy();
        origin.lookup_in_progress = true;

        let ids = (origin.id, staged.id);
        staged.provisional = true;
        let mut tx = repo.begin().unwrap();
        tx.add_content_set(origin).unwrap();
        tx.add_content_set(staged).unwrap();
        tx.commit().unwrap();
        Fixture {
            repo,
            origin: ids.0,
            staged: ids.1,
        }
    }

    fn terminology(concepts: &[(&str, &str)]) -> Arc<InMemoryTerminology> {
        let t = InMemoryTerminology::new();
        for (id, name) in concepts {
            t.insert("SNOMEDCT", "2025-01-31", TerminologyConcept::new(*id, *name))
                .unwrap();
        }
        Arc::new(t)
    }

    fn task(f: &Fixture, lookup: Arc<dyn NameLookup>, batch: usize, retries: u32) -> LookupTask {
        LookupTask::new(f.repo.clone(), lookup, f.origin, f.staged, batch, retries)
    }

    /// Fails the first `failures` calls.
    struct FlakyLookup {
        failures: AtomicU32,
        inner: TerminologyNameLookup,
    }

    impl NameLookup for FlakyLookup {
        fn lookup_names(
            &self,
            content_set: &ContentSet,
            concept_ids: &[String],
        ) -> ReleaseResult<HashMap<String, String>> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ReleaseError::Terminology("service unavailable".into()));
            }
            self.inner.lookup_names(content_set, concept_ids)
        }
    }

    fn flaky(failures: u32) -> Arc<dyn NameLookup> {
        Arc::new(FlakyLookup {
            failures: AtomicU32::new(failures),
            inner: TerminologyNameLookup::new(terminology(&[("100", "Asthma")])),
        })
    }

    #[test]
    fn inline_lookup_fills_names_and_clears_flag() {
        let f = fixture(&["100", "200", "300"]);
        let lookup = Arc::new(TerminologyNameLookup::new(terminology(&[
            ("100", "Asthma"),
            ("200", "Fever"),
        ])));

        let outcome = task(&f, lookup, 2, 0).run();
        assert_eq!(outcome, LookupOutcome::Completed { resolved: 2 });

        let staged = f.repo.content_set(&f.staged).unwrap().unwrap();
        let names: Vec<_> = staged.members.iter().map(|m| m.concept_name.clone()).collect();
        assert_eq!(
            names,
            vec![Some("Asthma".to_string()), Some("Fever".to_string()), None]
        );
        assert!(!f.repo.content_set(&f.origin).unwrap().unwrap().lookup_in_progress);
    }

    #[test]
    fn failed_batch_is_retried() {
        let f = fixture(&["100"]);
        let outcome = task(&f, flaky(2), 10, 3).run();
        assert_eq!(outcome, LookupOutcome::Completed { resolved: 1 });
        let staged = f.repo.content_set(&f.staged).unwrap().unwrap();
        assert_eq!(staged.members[0].concept_name.as_deref(), Some("Asthma"));
    }

    #[test]
    fn exhausted_retries_still_clear_flag() {
        let f = fixture(&["100"]);
        let outcome = task(&f, flaky(10), 10, 2).run();
        assert_eq!(outcome, LookupOutcome::GaveUp);
        assert!(!f.repo.content_set(&f.origin).unwrap().unwrap().lookup_in_progress);
        let staged = f.repo.content_set(&f.staged).unwrap().unwrap();
        assert!(staged.members[0].concept_name.is_none());
    }

    #[test]
    fn removed_target_abandons_lookup() {
        let f = fixture(&["100"]);
        let mut tx = f.repo.begin().unwrap();
        tx.remove_content_set(&f.staged).unwrap();
        tx.commit().unwrap();

        let outcome = task(&f, flaky(0), 10, 0).run();
        assert_eq!(outcome, LookupOutcome::Abandoned);
        assert!(!f.repo.content_set(&f.origin).unwrap().unwrap().lookup_in_progress);
    }

    #[test]
    fn inline_scheduler_runs_immediately() {
        let ran = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&ran);
        let handle = InlineScheduler.schedule(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(handle.is_finished());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tokio_scheduler_runs_in_background() {
        let f = fixture(&["100"]);
        let lookup = Arc::new(TerminologyNameLookup::new(terminology(&[("100", "Asthma")])));
        let job = task(&f, lookup, 10, 0);

        let scheduler = TokioScheduler::try_current().unwrap();
        let handle = scheduler.schedule(Box::new(move || {
            job.run();
        }));
        handle.wait().await;

        let staged = f.repo.content_set(&f.staged).unwrap().unwrap();
        assert_eq!(staged.members[0].concept_name.as_deref(), Some("Asthma"));
        assert!(!f.repo.content_set(&f.origin).unwrap().unwrap().lookup_in_progress);
    }
}

//! In-memory repository for tests, the CLI, and embedding.
//!
//! [`InMemoryRepository`] keeps a [`RepositoryState`] behind a `Mutex`. A
//! transaction holds the lock for its whole lifetime and mutates a private
//! copy of the state; commit swaps the copy in. Transactions are therefore
//! fully serialized, which is what makes the one-link-per-origin constraint
//! race-free. When a persistence path is configured, every commit also writes
//! the state to that file as JSON.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use refrel_types::{
    ArtifactId, ContentSet, ContentSetId, LinkId, Member, MemberId, ProjectId, ReleaseArtifact,
    ReleaseId, ReleaseRecord, StagedChangeLink,
};

use crate::error::{StoreError, StoreResult};
use crate::state::RepositoryState;
use crate::traits::{Repository, RepositoryReader, Transaction};

/// An in-memory implementation of [`Repository`].
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<RepositoryState>,
    persist_path: Option<PathBuf>,
}

impl InMemoryRepository {
    /// Create an empty, non-persistent repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository seeded with existing state.
    pub fn from_state(state: RepositoryState) -> Self {
        Self {
            state: Mutex::new(state),
            persist_path: None,
        }
    }

    /// Open a repository persisted at `path`.
    ///
    /// A missing file starts from empty state; it is created on first commit.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?
        } else {
            RepositoryState::new()
        };
        debug!(path = %path.display(), "opened repository state");
        Ok(Self {
            state: Mutex::new(state),
            persist_path: Some(path),
        })
    }

    /// A copy of the committed state.
    pub fn snapshot(&self) -> StoreResult<RepositoryState> {
        Ok(self.lock()?.clone())
    }

    /// Write the committed state to `path` as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let state = self.lock()?;
        write_state(path.as_ref(), &state)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, RepositoryState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Atomically replace `path` with the JSON encoding of `state`.
fn write_state(path: &Path, state: &RepositoryState) -> StoreResult<()> {
    let json =
        serde_json::to_vec_pretty(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl RepositoryReader for InMemoryRepository {
    fn content_set(&self, id: &ContentSetId) -> StoreResult<Option<ContentSet>> {
        self.lock()?.content_set(id)
    }

    fn content_sets(&self) -> StoreResult<Vec<ContentSet>> {
        self.lock()?.content_sets()
    }

    fn release(&self, id: &ReleaseId) -> StoreResult<Option<ReleaseRecord>> {
        self.lock()?.release(id)
    }

    fn releases_for(&self, content_set: &ContentSetId) -> StoreResult<Vec<ReleaseRecord>> {
        self.lock()?.releases_for(content_set)
    }

    fn published_releases(
        &self,
        terminology_id: &str,
        project: &ProjectId,
    ) -> StoreResult<Vec<ReleaseRecord>> {
        self.lock()?.published_releases(terminology_id, project)
    }

    fn staged_link_for_origin(
        &self,
        origin: &ContentSetId,
    ) -> StoreResult<Option<StagedChangeLink>> {
        self.lock()?.staged_link_for_origin(origin)
    }

    fn staged_link_for_staged(
        &self,
        staged: &ContentSetId,
    ) -> StoreResult<Option<StagedChangeLink>> {
        self.lock()?.staged_link_for_staged(staged)
    }
}

impl Repository for InMemoryRepository {
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>> {
        let guard = self.lock()?;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            persist_path: self.persist_path.as_deref(),
        }))
    }
}

/// A transaction over [`InMemoryRepository`].
struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, RepositoryState>,
    working: RepositoryState,
    persist_path: Option<&'a Path>,
}

impl RepositoryReader for MemoryTransaction<'_> {
    fn content_set(&self, id: &ContentSetId) -> StoreResult<Option<ContentSet>> {
        self.working.content_set(id)
    }

    fn content_sets(&self) -> StoreResult<Vec<ContentSet>> {
        self.working.content_sets()
    }

    fn release(&self, id: &ReleaseId) -> StoreResult<Option<ReleaseRecord>> {
        self.working.release(id)
    }

    fn releases_for(&self, content_set: &ContentSetId) -> StoreResult<Vec<ReleaseRecord>> {
        self.working.releases_for(content_set)
    }

    fn published_releases(
        &self,
        terminology_id: &str,
        project: &ProjectId,
    ) -> StoreResult<Vec<ReleaseRecord>> {
        self.working.published_releases(terminology_id, project)
    }

    fn staged_link_for_origin(
        &self,
        origin: &ContentSetId,
    ) -> StoreResult<Option<StagedChangeLink>> {
        self.working.staged_link_for_origin(origin)
    }

    fn staged_link_for_staged(
        &self,
        staged: &ContentSetId,
    ) -> StoreResult<Option<StagedChangeLink>> {
        self.working.staged_link_for_staged(staged)
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn add_content_set(&mut self, set: ContentSet) -> StoreResult<()> {
        self.working.add_content_set(set)
    }

    fn update_content_set(&mut self, set: &ContentSet) -> StoreResult<()> {
        self.working.update_content_set(set)
    }

    fn remove_content_set(&mut self, id: &ContentSetId) -> StoreResult<ContentSet> {
        self.working.remove_content_set(id)
    }

    fn add_member(&mut self, content_set: &ContentSetId, member: Member) -> StoreResult<()> {
        self.working.add_member(content_set, member)
    }

    fn update_member(&mut self, content_set: &ContentSetId, member: &Member) -> StoreResult<()> {
        self.working.update_member(content_set, member)
    }

    fn remove_member(
        &mut self,
        content_set: &ContentSetId,
        member: &MemberId,
    ) -> StoreResult<Member> {
        self.working.remove_member(content_set, member)
    }

    fn add_release(&mut self, record: ReleaseRecord) -> StoreResult<()> {
        self.working.add_release(record)
    }

    fn update_release(&mut self, record: &ReleaseRecord) -> StoreResult<()> {
        self.working.update_release(record)
    }

    fn remove_release(&mut self, id: &ReleaseId) -> StoreResult<ReleaseRecord> {
        self.working.remove_release(id)
    }

    fn add_artifact(&mut self, release: &ReleaseId, artifact: ReleaseArtifact) -> StoreResult<()> {
        self.working.add_artifact(release, artifact)
    }

    fn remove_artifact(
        &mut self,
        release: &ReleaseId,
        artifact: &ArtifactId,
    ) -> StoreResult<ReleaseArtifact> {
        self.working.remove_artifact(release, artifact)
    }

    fn add_staged_link(&mut self, link: StagedChangeLink) -> StoreResult<()> {
        self.working.add_staged_link(link)
    }

    fn remove_staged_link(&mut self, id: &LinkId) -> StoreResult<StagedChangeLink> {
        self.working.remove_staged_link(id)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            mut guard,
            working,
            persist_path,
        } = *self;
        if let Some(path) = persist_path {
            write_state(path, &working)?;
        }
        *guard = working;
        Ok(())
    }
}

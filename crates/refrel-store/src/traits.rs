//! Read and write boundaries of the repository.

use refrel_types::{
    ArtifactId, ContentSet, ContentSetId, LinkId, Member, MemberId, ProjectId, ReleaseArtifact,
    ReleaseId, ReleaseRecord, StagedChangeLink,
};

use crate::error::StoreResult;

/// Read boundary shared by repositories and open transactions.
///
/// All reads return owned, eagerly loaded aggregates.
pub trait RepositoryReader {
    fn content_set(&self, id: &ContentSetId) -> StoreResult<Option<ContentSet>>;

    fn content_sets(&self) -> StoreResult<Vec<ContentSet>>;

    fn release(&self, id: &ReleaseId) -> StoreResult<Option<ReleaseRecord>>;

    /// Release records scoped to the given content set, oldest first.
    fn releases_for(&self, content_set: &ContentSetId) -> StoreResult<Vec<ReleaseRecord>>;

    /// Published release records of every content set sharing
    /// `terminology_id` within `project`, oldest effective time first.
    fn published_releases(
        &self,
        terminology_id: &str,
        project: &ProjectId,
    ) -> StoreResult<Vec<ReleaseRecord>>;

    fn staged_link_for_origin(&self, origin: &ContentSetId)
        -> StoreResult<Option<StagedChangeLink>>;

    fn staged_link_for_staged(&self, staged: &ContentSetId)
        -> StoreResult<Option<StagedChangeLink>>;

    /// The staged copy linked to `origin`, if any.
    fn staged_copy_of(&self, origin: &ContentSetId) -> StoreResult<Option<ContentSet>> {
        match self.staged_link_for_origin(origin)? {
            Some(link) => self.content_set(&link.staged_id),
            None => Ok(None),
        }
    }
}

/// An open, all-or-nothing unit of work.
///
/// Changes are visible to reads through the same transaction immediately and
/// to everyone else only after [`commit`](Transaction::commit). Dropping an
/// uncommitted transaction rolls it back.
pub trait Transaction: RepositoryReader {
    fn add_content_set(&mut self, set: ContentSet) -> StoreResult<()>;

    fn update_content_set(&mut self, set: &ContentSet) -> StoreResult<()>;

    /// Remove a content set together with its owned members and concepts.
    fn remove_content_set(&mut self, id: &ContentSetId) -> StoreResult<ContentSet>;

    fn add_member(&mut self, content_set: &ContentSetId, member: Member) -> StoreResult<()>;

    fn update_member(&mut self, content_set: &ContentSetId, member: &Member) -> StoreResult<()>;

    fn remove_member(&mut self, content_set: &ContentSetId, member: &MemberId)
        -> StoreResult<Member>;

    fn add_release(&mut self, record: ReleaseRecord) -> StoreResult<()>;

    /// Replace a release record. Fails if the stored record is published.
    fn update_release(&mut self, record: &ReleaseRecord) -> StoreResult<()>;

    /// Remove a release record. Fails if the stored record is published.
    fn remove_release(&mut self, id: &ReleaseId) -> StoreResult<ReleaseRecord>;

    fn add_artifact(&mut self, release: &ReleaseId, artifact: ReleaseArtifact) -> StoreResult<()>;

    fn remove_artifact(
        &mut self,
        release: &ReleaseId,
        artifact: &ArtifactId,
    ) -> StoreResult<ReleaseArtifact>;

    /// Create a staged-change link. Fails with a conflict if the origin
    /// already has a live link.
    fn add_staged_link(&mut self, link: StagedChangeLink) -> StoreResult<()>;

    fn remove_staged_link(&mut self, id: &LinkId) -> StoreResult<StagedChangeLink>;

    /// Make every change in this transaction durable and visible.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Storage backend for the release engine.
///
/// Implementations must be thread-safe and must serialize conflicting
/// transactions so that uniqueness constraints hold under concurrency.
pub trait Repository: RepositoryReader + Send + Sync {
    /// Open a new transaction.
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>>;
}

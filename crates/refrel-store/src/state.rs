//! The serializable aggregate map behind [`InMemoryRepository`].
//!
//! [`InMemoryRepository`]: crate::memory::InMemoryRepository

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use refrel_types::{
    ArtifactId, ContentSet, ContentSetId, LinkId, Member, MemberId, ProjectId, ReleaseArtifact,
    ReleaseId, ReleaseRecord, StagedChangeLink,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::RepositoryReader;

/// Every aggregate known to the repository, keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    content_sets: BTreeMap<ContentSetId, ContentSet>,
    releases: BTreeMap<ReleaseId, ReleaseRecord>,
    links: BTreeMap<LinkId, StagedChangeLink>,
}

impl RepositoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_set_count(&self) -> usize {
        self.content_sets.len()
    }

    pub fn release_count(&self) -> usize {
        self.releases.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn add_content_set(&mut self, set: ContentSet) -> StoreResult<()> {
        if self.content_sets.contains_key(&set.id) {
            return Err(StoreError::already_exists("content set", set.id));
        }
        self.content_sets.insert(set.id, set);
        Ok(())
    }

    pub(crate) fn update_content_set(&mut self, set: &ContentSet) -> StoreResult<()> {
        let slot = self
            .content_sets
            .get_mut(&set.id)
            .ok_or_else(|| StoreError::not_found("content set", set.id))?;
        *slot = set.clone();
        Ok(())
    }

    pub(crate) fn remove_content_set(&mut self, id: &ContentSetId) -> StoreResult<ContentSet> {
        self.content_sets
            .remove(id)
            .ok_or_else(|| StoreError::not_found("content set", id))
    }

    fn content_set_mut(&mut self, id: &ContentSetId) -> StoreResult<&mut ContentSet> {
        self.content_sets
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("content set", id))
    }

    pub(crate) fn add_member(&mut self, content_set: &ContentSetId, member: Member) -> StoreResult<()> {
        let set = self.content_set_mut(content_set)?;
        if set.members.iter().any(|m| m.id == member.id) {
            return Err(StoreError::already_exists("member", member.id));
        }
        set.members.push(member);
        Ok(())
    }

    pub(crate) fn update_member(
        &mut self,
        content_set: &ContentSetId,
        member: &Member,
    ) -> StoreResult<()> {
        let set = self.content_set_mut(content_set)?;
        let slot = set
            .members
            .iter_mut()
            .find(|m| m.id == member.id)
            .ok_or_else(|| StoreError::not_found("member", member.id))?;
        *slot = member.clone();
        Ok(())
    }

    pub(crate) fn remove_member(
        &mut self,
        content_set: &ContentSetId,
        member: &MemberId,
    ) -> StoreResult<Member> {
        let set = self.content_set_mut(content_set)?;
        let index = set
            .members
            .iter()
            .position(|m| &m.id == member)
            .ok_or_else(|| StoreError::not_found("member", member))?;
        Ok(set.members.remove(index))
    }

    pub(crate) fn add_release(&mut self, record: ReleaseRecord) -> StoreResult<()> {
        if self.releases.contains_key(&record.id) {
            return Err(StoreError::already_exists("release record", record.id));
        }
        if !self.content_sets.contains_key(&record.content_set_id) {
            return Err(StoreError::not_found("content set", record.content_set_id));
        }
        self.releases.insert(record.id, record);
        Ok(())
    }

    fn mutable_release(&mut self, id: &ReleaseId) -> StoreResult<&mut ReleaseRecord> {
        let record = self
            .releases
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("release record", id))?;
        if record.published {
            return Err(StoreError::Immutable(format!(
                "release record {} is published",
                record.id
            )));
        }
        Ok(record)
    }

    pub(crate) fn update_release(&mut self, record: &ReleaseRecord) -> StoreResult<()> {
        let slot = self.mutable_release(&record.id)?;
        *slot = record.clone();
        Ok(())
    }

    pub(crate) fn remove_release(&mut self, id: &ReleaseId) -> StoreResult<ReleaseRecord> {
        self.mutable_release(id)?;
        self.releases
            .remove(id)
            .ok_or_else(|| StoreError::not_found("release record", id))
    }

    pub(crate) fn add_artifact(
        &mut self,
        release: &ReleaseId,
        artifact: ReleaseArtifact,
    ) -> StoreResult<()> {
        let record = self.mutable_release(release)?;
        if record.artifacts.iter().any(|a| a.id == artifact.id) {
            return Err(StoreError::already_exists("artifact", artifact.id));
        }
        record.artifacts.push(artifact);
        Ok(())
    }

    pub(crate) fn remove_artifact(
        &mut self,
        release: &ReleaseId,
        artifact: &ArtifactId,
    ) -> StoreResult<ReleaseArtifact> {
        let record = self.mutable_release(release)?;
        let index = record
            .artifacts
            .iter()
            .position(|a| &a.id == artifact)
            .ok_or_else(|| StoreError::not_found("artifact", artifact))?;
        Ok(record.artifacts.remove(index))
    }

    pub(crate) fn add_staged_link(&mut self, link: StagedChangeLink) -> StoreResult<()> {
        if let Some(existing) = self.links.values().find(|l| l.origin_id == link.origin_id) {
            return Err(StoreError::Conflict(format!(
                "content set {} already has a staged copy {} ({})",
                link.origin_id, existing.staged_id, existing.staging_type
            )));
        }
        if self.links.contains_key(&link.id) {
            return Err(StoreError::already_exists("staged-change link", link.id));
        }
        self.links.insert(link.id, link);
        Ok(())
    }

    pub(crate) fn remove_staged_link(&mut self, id: &LinkId) -> StoreResult<StagedChangeLink> {
        self.links
            .remove(id)
            .ok_or_else(|| StoreError::not_found("staged-change link", id))
    }
}

impl RepositoryReader for RepositoryState {
    fn content_set(&self, id: &ContentSetId) -> StoreResult<Option<ContentSet>> {
        Ok(self.content_sets.get(id).cloned())
    }

    fn content_sets(&self) -> StoreResult<Vec<ContentSet>> {
        Ok(self.content_sets.values().cloned().collect())
    }

    fn release(&self, id: &ReleaseId) -> StoreResult<Option<ReleaseRecord>> {
        Ok(self.releases.get(id).cloned())
    }

    fn releases_for(&self, content_set: &ContentSetId) -> StoreResult<Vec<ReleaseRecord>> {
        // Release ids are UUID v7, so map order is creation order.
        Ok(self
            .releases
            .values()
            .filter(|r| &r.content_set_id == content_set)
            .cloned()
            .collect())
    }

    fn published_releases(
        &self,
        terminology_id: &str,
        project: &ProjectId,
    ) -> StoreResult<Vec<ReleaseRecord>> {
        let mut records: Vec<ReleaseRecord> = self
            .releases
            .values()
            .filter(|r| r.published)
            .filter(|r| {
                self.content_sets.get(&r.content_set_id).is_some_and(|set| {
                    set.terminology_id == terminology_id && &set.project_id == project
                })
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.effective_time);
        Ok(records)
    }

    fn staged_link_for_origin(
        &self,
        origin: &ContentSetId,
    ) -> StoreResult<Option<StagedChangeLink>> {
        Ok(self
            .links
            .values()
            .find(|l| &l.origin_id == origin)
            .cloned())
    }

    fn staged_link_for_staged(
        &self,
        staged: &ContentSetId,
    ) -> StoreResult<Option<StagedChangeLink>> {
        Ok(self
            .links
            .values()
            .find(|l| &l.staged_id == staged)
            .cloned())
    }
}

//! Snapshot and delta artifacts for a staged release.

use tracing::debug;

use refrel_types::{ArtifactKind, ContentSet, EffectiveTime, Member, ReleaseArtifact};

use crate::delta::{content_set_delta, translation_delta};
use crate::error::ExportResult;
use crate::handler::ExportHandler;

/// Builds release artifacts through one export handler.
pub struct ArtifactGenerator<'a> {
    handler: &'a dyn ExportHandler,
    namespace: &'a str,
    effective_time: EffectiveTime,
    beta: bool,
}

impl<'a> ArtifactGenerator<'a> {
    pub fn new(
        handler: &'a dyn ExportHandler,
        namespace: &'a str,
        effective_time: EffectiveTime,
        beta: bool,
    ) -> Self {
        Self {
            handler,
            namespace,
            effective_time,
            beta,
        }
    }

    fn artifact(&self, staged: &ContentSet, kind: ArtifactKind, payload: Vec<u8>) -> ReleaseArtifact {
        let name = self.handler.file_name(
            self.namespace,
            kind,
            staged,
            &self.effective_time.release_name(),
            self.beta,
        );
        debug!(artifact = %name, bytes = payload.len(), "generated artifact");
        ReleaseArtifact::new(name, kind, payload)
    }

    /// Full export of the staged copy.
    ///
    /// Reference sets export their active members as an `ActiveSnapshot`.
    /// Translations export every concept as a `Snapshot`. Rows without an
    /// effective time take the release's.
    pub fn snapshot(&self, staged: &ContentSet) -> ExportResult<ReleaseArtifact> {
        if staged.is_translation() {
            let mut concepts = staged.concepts.clone();
            for concept in &mut concepts {
                for description in &mut concept.descriptions {
                    description.effective_time = description.effective_time.or(Some(self.effective_time));
                }
            }
            let payload = self.handler.export_concepts(staged, &concepts)?;
            return Ok(self.artifact(staged, ArtifactKind::Snapshot, payload));
        }

        let members: Vec<Member> = staged
            .active_members()
            .map(|m| Member {
                effective_time: m.effective_time.or(Some(self.effective_time)),
                ..m.clone()
            })
            .collect();
        let payload = self.handler.export_members(staged, &members)?;
        Ok(self.artifact(staged, ArtifactKind::ActiveSnapshot, payload))
    }

    /// Incremental export of the staged copy against the last published
    /// release.
    pub fn delta(&self, staged: &ContentSet, previous: &ContentSet) -> ExportResult<ReleaseArtifact> {
        if staged.is_translation() {
            let mut concepts = translation_delta(staged);
            for concept in &mut concepts {
                for description in &mut concept.descriptions {
                    description.effective_time = Some(self.effective_time);
                }
            }
            let payload = self.handler.export_concepts(staged, &concepts)?;
            return Ok(self.artifact(staged, ArtifactKind::Delta, payload));
        }

        let rows = content_set_delta(staged, previous, self.effective_time);
        let payload = self.handler.export_members(staged, &rows)?;
        Ok(self.artifact(staged, ArtifactKind::SimpleRefsetDelta, payload))
    }
}

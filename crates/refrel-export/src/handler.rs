//! The export handler boundary and the default RF2 implementation.

use uuid::Uuid;

use refrel_types::{ArtifactKind, Concept, ContentSet, ContentSetKind, EffectiveTime, Member};

use crate::error::{ExportError, ExportResult};

/// Id under which [`Rf2ExportHandler`] is registered.
pub const DEFAULT_HANDLER_ID: &str = "DEFAULT";

/// RF2 synonym description type.
const SYNONYM_TYPE_ID: &str = "900000000000013009";
/// RF2 "entire term case insensitive".
const CASE_INSENSITIVE_ID: &str = "900000000000448009";

/// Turns content-set rows into a byte stream and names the resulting files.
///
/// The release engine never looks inside the bytes it gets back.
pub trait ExportHandler: Send + Sync {
    /// Registry key.
    fn id(&self) -> &str;

    /// Serialize reference-set member rows.
    fn export_members(&self, content_set: &ContentSet, members: &[Member]) -> ExportResult<Vec<u8>>;

    /// Serialize translation concepts and their descriptions.
    fn export_concepts(
        &self,
        content_set: &ContentSet,
        concepts: &[Concept],
    ) -> ExportResult<Vec<u8>>;

    /// File name for an artifact of `kind`. Beta artifacts are marked so they
    /// can never be mistaken for a production release.
    fn file_name(
        &self,
        namespace: &str,
        kind: ArtifactKind,
        content_set: &ContentSet,
        release_name: &str,
        beta: bool,
    ) -> String;
}

/// Tab-separated RF2 export.
///
/// Reference sets become simple-refset rows, translations become description
/// rows. Member row ids are name-based UUIDs of the refset and concept so the
/// same row keeps its id across releases.
#[derive(Clone, Debug, Default)]
pub struct Rf2ExportHandler;

impl Rf2ExportHandler {
    pub fn new() -> Self {
        Self
    }

    /// Stable RF2 row id for `concept_id` within `refset_id`.
    pub fn member_row_id(refset_id: &str, concept_id: &str) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{refset_id}:{concept_id}").as_bytes(),
        )
    }

    fn description_row_id(concept_id: &str, language: &str, term: &str) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{concept_id}:{language}:{term}").as_bytes(),
        )
    }
}

fn effective(time: Option<EffectiveTime>) -> String {
    time.map(|t| t.release_name()).unwrap_or_default()
}

fn push_row(out: &mut Vec<u8>, fields: &[&str]) {
    out.extend_from_slice(fields.join("\t").as_bytes());
    out.extend_from_slice(b"\r\n");
}

impl ExportHandler for Rf2ExportHandler {
    fn id(&self) -> &str {
        DEFAULT_HANDLER_ID
    }

    fn export_members(&self, content_set: &ContentSet, members: &[Member]) -> ExportResult<Vec<u8>> {
        if content_set.is_translation() {
            return Err(ExportError::Unsupported {
                handler: DEFAULT_HANDLER_ID.into(),
                what: format!("members of translation {}", content_set.name),
            });
        }

        let mut out = Vec::new();
        push_row(
            &mut out,
            &[
                "id",
                "effectiveTime",
                "active",
                "moduleId",
                "refsetId",
                "referencedComponentId",
            ],
        );
        for member in members {
            let id = Self::member_row_id(&content_set.terminology_id, &member.concept_id);
            push_row(
                &mut out,
                &[
                    &id.to_string(),
                    &effective(member.effective_time),
                    if member.active { "1" } else { "0" },
                    &content_set.module_id,
                    &content_set.terminology_id,
                    &member.concept_id,
                ],
            );
        }
        Ok(out)
    }

    fn export_concepts(
        &self,
        content_set: &ContentSet,
        concepts: &[Concept],
    ) -> ExportResult<Vec<u8>> {
        if !content_set.is_translation() {
            return Err(ExportError::Unsupported {
                handler: DEFAULT_HANDLER_ID.into(),
                what: format!("concepts of reference set {}", content_set.name),
            });
        }

        let mut out = Vec::new();
        push_row(
            &mut out,
            &[
                "id",
                "effectiveTime",
                "active",
                "moduleId",
                "conceptId",
                "languageCode",
                "typeId",
                "term",
                "caseSignificanceId",
            ],
        );
        for concept in concepts {
            for description in &concept.descriptions {
                let id = Self::description_row_id(
                    &concept.concept_id,
                    &description.language,
                    &description.term,
                );
                push_row(
                    &mut out,
                    &[
                        &id.to_string(),
                        &effective(description.effective_time),
                        "1",
                        &content_set.module_id,
                        &concept.concept_id,
                        &description.language,
                        SYNONYM_TYPE_ID,
                        &description.term,
                        CASE_INSENSITIVE_ID,
                    ],
                );
            }
        }
        Ok(out)
    }

    fn file_name(
        &self,
        namespace: &str,
        kind: ArtifactKind,
        content_set: &ContentSet,
        release_name: &str,
        beta: bool,
    ) -> String {
        let prefix = if beta { "x" } else { "" };
        match &content_set.kind {
            ContentSetKind::Translation { language } => format!(
                "{prefix}sct2_Description_{}-{language}_{namespace}_{release_name}.txt",
                kind.label()
            ),
            ContentSetKind::ReferenceSet { .. } => format!(
                "{prefix}der2_Refset_{}{}_{namespace}_{release_name}.txt",
                content_set.terminology_id,
                kind.label()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refrel_types::{Description, MemberType, ProjectId, RefsetType};

    fn refset() -> ContentSet {
        ContentSet::reference_set(
            "450990004",
            "Adverse reactions",
            RefsetType::Extensional,
            ProjectId::new(),
            "731000124108",
        )
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn member_rows_are_tab_separated() {
        let set = refset();
        let mut member = Member::new("100", MemberType::Member);
        member.effective_time = Some(EffectiveTime::from_ymd(2025, 1, 31).unwrap());
        let mut retired = Member::new("200", MemberType::Member);
        retired.active = false;

        let out = Rf2ExportHandler.export_members(&set, &[member, retired]).unwrap();
        let rows = lines(&out);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("id\teffectiveTime"));

        let fields: Vec<_> = rows[1].split('\t').collect();
        assert_eq!(fields[1], "20250131");
        assert_eq!(fields[2], "1");
        assert_eq!(fields[3], "731000124108");
        assert_eq!(fields[4], "450990004");
        assert_eq!(fields[5], "100");

        let fields: Vec<_> = rows[2].split('\t').collect();
        assert_eq!(fields[1], "");
        assert_eq!(fields[2], "0");
    }

    #[test]
    fn member_row_id_is_stable() {
        let a = Rf2ExportHandler::member_row_id("450990004", "100");
        let b = Rf2ExportHandler::member_row_id("450990004", "100");
        let c = Rf2ExportHandler::member_row_id("450990004", "101");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn translation_emits_description_rows() {
        let mut set = ContentSet::translation("t1", "Spanish", "es", ProjectId::new(), "mod");
        let mut concept = Concept::new("100", "Asthma");
        concept.descriptions.push(Description {
            term: "asma".into(),
            language: "es".into(),
            effective_time: None,
        });
        set.concepts.push(concept);

        let out = Rf2ExportHandler.export_concepts(&set, &set.concepts).unwrap();
        let rows = lines(&out);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("\tasma\t"));
        assert!(Rf2ExportHandler.export_members(&set, &[]).is_err());
    }

    #[test]
    fn beta_file_names_are_prefixed() {
        let set = refset();
        let name = Rf2ExportHandler.file_name(
            "INT",
            ArtifactKind::SimpleRefsetDelta,
            &set,
            "20250131",
            true,
        );
        assert_eq!(name, "xder2_Refset_450990004SimpleRefsetDelta_INT_20250131.txt");

        let name =
            Rf2ExportHandler.file_name("INT", ArtifactKind::ActiveSnapshot, &set, "20250131", false);
        assert!(name.starts_with("der2_Refset_"));
    }

    #[test]
    fn translation_file_name_carries_language() {
        let set = ContentSet::translation("t1", "Spanish", "es", ProjectId::new(), "mod");
        let name = Rf2ExportHandler.file_name("INT", ArtifactKind::Delta, &set, "20250131", false);
        assert_eq!(name, "sct2_Description_Delta-es_INT_20250131.txt");
    }
}

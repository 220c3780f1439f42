//! Terminology handler boundary.
//!
//! The release engine only asks whether a concept exists in a given code
//! system version, and what it is called.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{ReleaseError, ReleaseResult};

/// A concept as reported by a code system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminologyConcept {
    pub concept_id: String,
    pub name: String,
    pub active: bool,
}

impl TerminologyConcept {
    pub fn new(concept_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            concept_id: concept_id.into(),
            name: name.into(),
            active: true,
        }
    }
}

/// Access to versioned code systems.
pub trait TerminologyHandler: Send + Sync {
    /// Look up `concept_id` in `terminology` at `version`.
    fn get_concept(
        &self,
        concept_id: &str,
        terminology: &str,
        version: &str,
    ) -> ReleaseResult<Option<TerminologyConcept>>;

    /// Returns `true` if the concept exists and is active at `version`.
    fn is_reachable(&self, concept_id: &str, terminology: &str, version: &str) -> ReleaseResult<bool> {
        Ok(self
            .get_concept(concept_id, terminology, version)?
            .is_some_and(|c| c.active))
    }
}

type VersionKey = (String, String);

/// A terminology handler backed by in-memory maps.
#[derive(Debug, Default)]
pub struct InMemoryTerminology {
    versions: RwLock<HashMap<VersionKey, HashMap<String, TerminologyConcept>>>,
}

impl InMemoryTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a concept in `terminology` at `version`.
    pub fn insert(
        &self,
        terminology: &str,
        version: &str,
        concept: TerminologyConcept,
    ) -> ReleaseResult<()> {
        let mut versions = self
            .versions
            .write()
            .map_err(|_| ReleaseError::Terminology("terminology lock poisoned".into()))?;
        versions
            .entry((terminology.to_string(), version.to_string()))
            .or_default()
            .insert(concept.concept_id.clone(), concept);
        Ok(())
    }
}

impl TerminologyHandler for InMemoryTerminology {
    fn get_concept(
        &self,
        concept_id: &str,
        terminology: &str,
        version: &str,
    ) -> ReleaseResult<Option<TerminologyConcept>> {
        let versions = self
            .versions
            .read()
            .map_err(|_| ReleaseError::Terminology("terminology lock poisoned".into()))?;
        Ok(versions
            .get(&(terminology.to_string(), version.to_string()))
            .and_then(|concepts| concepts.get(concept_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concepts_are_scoped_by_version() {
        let terminology = InMemoryTerminology::new();
        terminology
            .insert("SNOMEDCT", "2025-01-31", TerminologyConcept::new("100", "Asthma"))
            .unwrap();

        let found = terminology.get_concept("100", "SNOMEDCT", "2025-01-31").unwrap();
        assert_eq!(found.map(|c| c.name), Some("Asthma".to_string()));
        assert!(terminology.get_concept("100", "SNOMEDCT", "2025-07-31").unwrap().is_none());
        assert!(terminology.get_concept("100", "ICD10", "2025-01-31").unwrap().is_none());
    }

    #[test]
    fn inactive_concepts_are_unreachable() {
        let terminology = InMemoryTerminology::new();
        let mut retired = TerminologyConcept::new("200", "Old");
        retired.active = false;
        terminology.insert("SNOMEDCT", "v2", retired).unwrap();
        terminology
            .insert("SNOMEDCT", "v2", TerminologyConcept::new("100", "Asthma"))
            .unwrap();

        assert!(!terminology.is_reachable("200", "SNOMEDCT", "v2").unwrap());
        assert!(terminology.is_reachable("100", "SNOMEDCT", "v2").unwrap());
        assert!(!terminology.is_reachable("300", "SNOMEDCT", "v2").unwrap());
    }
}

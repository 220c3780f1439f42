use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ExportError, ExportResult};
use crate::handler::{ExportHandler, Rf2ExportHandler};

/// Export handlers keyed by id.
#[derive(Clone, Default)]
pub struct ExportHandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ExportHandler>>,
}

impl ExportHandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the RF2 handler under `DEFAULT`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.handlers.insert(
            crate::handler::DEFAULT_HANDLER_ID.to_string(),
            Arc::new(Rf2ExportHandler::new()),
        );
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ExportHandler>) -> ExportResult<()> {
        let id = handler.id().to_string();
        if self.handlers.contains_key(&id) {
            return Err(ExportError::DuplicateHandler(id));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    pub fn get(&self, id: &str) -> ExportResult<Arc<dyn ExportHandler>> {
        self.handlers
            .get(id)
            .cloned()
            .ok_or_else(|| ExportError::UnknownHandler(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ExportHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportHandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_contain_rf2() {
        let registry = ExportHandlerRegistry::with_defaults();
        assert_eq!(registry.get("DEFAULT").unwrap().id(), "DEFAULT");
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["DEFAULT"]);
    }

    #[test]
    fn unknown_handler_is_an_error() {
        let registry = ExportHandlerRegistry::new();
        assert!(matches!(
            registry.get("CSV"),
            Err(ExportError::UnknownHandler(id)) if id == "CSV"
        ));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ExportHandlerRegistry::with_defaults();
        let err = registry.register(Arc::new(Rf2ExportHandler)).unwrap_err();
        assert!(matches!(err, ExportError::DuplicateHandler(_)));
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReleaseError, ReleaseResult};

/// Tunables for the release engine.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Namespace written into artifact file names.
    pub namespace: String,
    /// Export handler used when the caller does not name one.
    pub default_export_handler: String,
    /// Records per commit during bulk reconciliation.
    pub batch_size: usize,
    /// Concepts per commit during the background name lookup.
    pub lookup_batch_size: usize,
    /// Attempts per lookup batch after the first failure.
    pub lookup_retries: u32,
    /// Run the name lookup on a background task when a runtime is available.
    pub lookup_in_background: bool,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            namespace: "INT".into(),
            default_export_handler: refrel_export::DEFAULT_HANDLER_ID.into(),
            batch_size: 200,
            lookup_batch_size: 100,
            lookup_retries: 3,
            lookup_in_background: true,
        }
    }
}

impl ReleaseConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> ReleaseResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ReleaseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ReleaseResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReleaseError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ReleaseResult<()> {
        if self.batch_size == 0 {
            return Err(ReleaseError::Config("batch_size must be positive".into()));
        }
        if self.lookup_batch_size == 0 {
            return Err(ReleaseError::Config("lookup_batch_size must be positive".into()));
        }
        if self.namespace.is_empty() {
            return Err(ReleaseError::Config("namespace must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ReleaseConfig::default();
        assert_eq!(c.namespace, "INT");
        assert_eq!(c.default_export_handler, "DEFAULT");
        assert_eq!(c.batch_size, 200);
        assert_eq!(c.lookup_batch_size, 100);
        assert_eq!(c.lookup_retries, 3);
        assert!(c.lookup_in_background);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ReleaseConfig::from_toml_str("namespace = \"1000124\"\nbatch_size = 50\n").unwrap();
        assert_eq!(c.namespace, "1000124");
        assert_eq!(c.batch_size, 50);
        assert_eq!(c.lookup_retries, 3);
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = ReleaseConfig::from_toml_str("batch_size = 0").unwrap_err();
        assert!(matches!(err, ReleaseError::Config(_)));
        let err = ReleaseConfig::from_toml_str("lookup_batch_size = 0").unwrap_err();
        assert!(matches!(err, ReleaseError::Config(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        assert!(matches!(
            ReleaseConfig::from_toml_str("batch_size = \"many\""),
            Err(ReleaseError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lookup_in_background = false").unwrap();
        let c = ReleaseConfig::load(file.path()).unwrap();
        assert!(!c.lookup_in_background);

        assert!(ReleaseConfig::load("/nonexistent/refrel.toml").is_err());
    }
}

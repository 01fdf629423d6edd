//! Pluggable config validation strategies.
//!
//! Schema validation checks values only; filesystem validation also checks
//! that the root and entries exist.

use std::path::{Path, PathBuf};

use crate::config::SatchelConfig;
use crate::error::{ConfigError, Result};

pub trait ConfigValidator {
    fn validate(&self, config: &SatchelConfig) -> Result<()>;
}

/// Value checks with no filesystem access.
///
/// ```
/// use satchel_config::{ConfigValidator, SatchelConfig, SchemaValidator};
///
/// let mut config = SatchelConfig::default();
/// config.bundle.entries = vec!["index.html".into()];
/// SchemaValidator.validate(&config).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &SatchelConfig) -> Result<()> {
        let bundle = &config.bundle;

        if bundle.entries.is_empty() {
            return Err(ConfigError::NoEntries);
        }
        if bundle.entries.iter().any(|entry| entry.as_os_str().is_empty()) {
            return Err(ConfigError::SchemaValidation {
                message: "entry paths cannot be empty".to_string(),
                hint: Some("Remove empty strings from bundle.entries".to_string()),
            });
        }

        if bundle.workers == Some(0) {
            return Err(ConfigError::SchemaValidation {
                message: "workers must be at least 1".to_string(),
                hint: Some("Remove bundle.workers to use one worker per core".to_string()),
            });
        }

        if let Some(extensions) = &bundle.extensions {
            if extensions
                .iter()
                .any(|ext| ext.trim_start_matches('.').trim().is_empty())
            {
                return Err(ConfigError::SchemaValidation {
                    message: "resolver extensions cannot be empty".to_string(),
                    hint: Some("Use names like \"js\" or \".ts\"".to_string()),
                });
            }
        }

        let dev = config.dev();
        if !dev.hmr_path.starts_with('/') {
            return Err(ConfigError::SchemaValidation {
                message: format!("hmr_path '{}' must start with '/'", dev.hmr_path),
                hint: None,
            });
        }
        if bundle.hmr && dev.hmr_port == Some(0) {
            return Err(ConfigError::SchemaValidation {
                message: "hmr_port cannot be 0 while live updates are enabled".to_string(),
                hint: Some("Remove dev.hmr_port to pick a free port automatically".to_string()),
            });
        }

        Ok(())
    }
}

/// Schema checks plus existence of the root directory and every entry.
pub struct FsValidator {
    base: PathBuf,
}

impl FsValidator {
    /// `base` is the directory relative paths in the config resolve against.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }
}

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &SatchelConfig) -> Result<()> {
        SchemaValidator.validate(config)?;

        let root = match &config.bundle.root_dir {
            Some(dir) => self.base.join(dir),
            None => self.base.clone(),
        };
        if !root.is_dir() {
            return Err(ConfigError::RootNotFound { path: root });
        }

        for entry in &config.bundle.entries {
            let path = root.join(entry);
            if !path.is_file() {
                return Err(ConfigError::EntryNotFound { path });
            }
        }

        Ok(())
    }
}

pub fn validate_schema(config: &SatchelConfig) -> Result<()> {
    SchemaValidator.validate(config)
}

pub fn validate_fs(config: &SatchelConfig, base: impl AsRef<Path>) -> Result<()> {
    FsValidator::new(base).validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DevConfig;

    fn with_entry() -> SatchelConfig {
        let mut config = SatchelConfig::default();
        config.bundle.entries = vec![PathBuf::from("index.js")];
        config
    }

    #[test]
    fn rejects_empty_entries() {
        let result = SchemaValidator.validate(&SatchelConfig::default());
        assert!(matches!(result.unwrap_err(), ConfigError::NoEntries));
    }

    #[test]
    fn accepts_minimal_config() {
        assert!(validate_schema(&with_entry()).is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = with_entry();
        config.bundle.workers = Some(0);
        assert!(matches!(
            validate_schema(&config).unwrap_err(),
            ConfigError::SchemaValidation { .. }
        ));
    }

    #[test]
    fn hmr_port_zero_only_matters_with_hmr() {
        let mut config = with_entry();
        config.dev = Some(DevConfig {
            hmr_port: Some(0),
            ..DevConfig::default()
        });
        assert!(validate_schema(&config).is_ok());

        config.bundle.hmr = true;
        let err = validate_schema(&config).unwrap_err();
        assert!(err.to_string().contains("hmr_port"));
        assert!(err.hint().is_some());
    }

    #[test]
    fn rejects_relative_hmr_path() {
        let mut config = with_entry();
        config.dev = Some(DevConfig {
            hmr_path: "events".into(),
            ..DevConfig::default()
        });
        assert!(validate_schema(&config).is_err());
    }

    #[test]
    fn rejects_blank_extensions() {
        let mut config = with_entry();
        config.bundle.extensions = Some(vec!["js".into(), ".".into()]);
        assert!(validate_schema(&config).is_err());
    }
}

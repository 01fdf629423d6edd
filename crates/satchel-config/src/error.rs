//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    // Filesystem validation errors (for CLI use)
    #[error("entry path not found: {}", path.display())]
    EntryNotFound { path: PathBuf },

    #[error("root directory not found: {}", path.display())]
    RootNotFound { path: PathBuf },

    // Config parsing/loading errors
    #[error("config not found")]
    NotFound,

    #[error("profile '{0}' is not defined")]
    ProfileNotFound(String),

    #[error("invalid config value for '{field}'{}", hint.as_ref().map(|h| format!(": {h}")).unwrap_or_default())]
    InvalidValue { field: String, hint: Option<String> },

    #[error("invalid profile override: {message}")]
    InvalidProfileOverride { message: String },

    // Schema validation errors (no filesystem checks)
    #[error("no entries specified")]
    NoEntries,

    #[error("{message}")]
    SchemaValidation {
        message: String,
        hint: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Suggested fix, when the error has one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { hint, .. } | ConfigError::SchemaValidation { hint, .. } => {
                hint.as_deref()
            }
            ConfigError::NotFound => {
                Some("Create a satchel.toml or add a 'satchel' field to package.json")
            }
            ConfigError::NoEntries => {
                Some("Pass entry files on the command line or set bundle.entries")
            }
            _ => None,
        }
    }
}

//! File-based config discovery for CLI use.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::SatchelConfig;
use crate::error::{ConfigError, Result};

/// Dedicated config file name.
pub const CONFIG_FILE: &str = "satchel.toml";

/// Field of `package.json` holding the config.
pub const PACKAGE_FIELD: &str = "satchel";

/// Finds and loads the config of a project directory.
///
/// ```no_run
/// use satchel_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config file in the root directory.
    ///
    /// Searches in this order:
    /// 1. `satchel.toml`
    /// 2. `package.json` with a `satchel` field
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(CONFIG_FILE);
        if toml_path.is_file() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join("package.json");
        let content = fs::read_to_string(&pkg_path).ok()?;
        let parsed: Value = serde_json::from_str(&content).ok()?;
        match parsed.get(PACKAGE_FIELD) {
            Some(field) if !field.is_null() => Some(pkg_path),
            _ => None,
        }
    }

    /// Load the discovered config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<SatchelConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        load_from(&path)
    }

    /// Load the discovered config, or the defaults when there is none.
    pub fn load_or_default(&self) -> Result<SatchelConfig> {
        match self.find() {
            Some(path) => load_from(&path),
            None => Ok(SatchelConfig::default()),
        }
    }

    pub fn load_with_profile(&self, profile: &str) -> Result<SatchelConfig> {
        self.load()?.materialize_profile(Some(profile))
    }
}

/// Load a config from an explicit path.
///
/// `package.json` is read through its `satchel` field, other `.json` files
/// as a whole, and everything else as TOML.
pub fn load_from(path: &Path) -> Result<SatchelConfig> {
    tracing::debug!("Loading config from {}", path.display());
    let content = fs::read_to_string(path)?;

    if path.file_name().is_some_and(|name| name == "package.json") {
        return from_package_json(&content);
    }

    if path.extension().is_some_and(|ext| ext == "json") {
        let value: Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                field: path.display().to_string(),
                hint: Some(format!("Invalid JSON: {}", e)),
            })?;
        return SatchelConfig::from_value(value);
    }

    toml::from_str(&content).map_err(|e| ConfigError::InvalidValue {
        field: path.display().to_string(),
        hint: Some(format!("Invalid TOML: {}", e)),
    })
}

fn from_package_json(content: &str) -> Result<SatchelConfig> {
    let parsed: Value = serde_json::from_str(content).map_err(|e| ConfigError::InvalidValue {
        field: "package.json".to_string(),
        hint: Some(format!("Invalid JSON: {}", e)),
    })?;

    match parsed.get(PACKAGE_FIELD) {
        Some(value) if !value.is_null() => SatchelConfig::from_value(value.clone()),
        _ => Err(ConfigError::InvalidValue {
            field: PACKAGE_FIELD.to_string(),
            hint: Some("Add a 'satchel' field to your package.json".to_string()),
        }),
    }
}

/// Discover and load the config of the current directory.
pub fn discover() -> Result<SatchelConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}

/// Discover the config of the current directory and apply `profile`.
pub fn discover_with_profile(profile: &str) -> Result<SatchelConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load_with_profile(profile)
}

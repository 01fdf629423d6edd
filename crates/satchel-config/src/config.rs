//! The top-level configuration document and profile merging.
//!
//! For file discovery, see the `discovery` module.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use satchel_bundler::BundlerOptions;

use crate::bundle::BundleOptions;
use crate::dev::DevConfig;
use crate::error::{ConfigError, Result};
use crate::settings::GlobalSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SatchelConfig {
    #[serde(default)]
    pub bundle: BundleOptions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<DevConfig>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub profiles: IndexMap<String, ProfileConfig>,

    #[serde(default)]
    pub settings: GlobalSettings,
}

/// Partial overrides applied by [`SatchelConfig::materialize_profile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub bundle: Value,

    #[serde(default)]
    pub dev: Value,

    #[serde(default)]
    pub settings: Value,
}

impl SatchelConfig {
    /// Create from a JSON value, such as the `satchel` field of `package.json`.
    ///
    /// ```
    /// use satchel_config::SatchelConfig;
    /// use serde_json::json;
    /// use std::path::PathBuf;
    ///
    /// let config = SatchelConfig::from_value(json!({
    ///     "bundle": { "entries": ["index.html"], "minify": true }
    /// }))
    /// .unwrap();
    /// assert_eq!(config.bundle.entries, vec![PathBuf::from("index.html")]);
    /// ```
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Deep-merge the named profile over the base sections.
    ///
    /// Objects merge key by key; arrays and scalars in the profile replace
    /// the base value. `None` leaves the config unchanged.
    pub fn materialize_profile(mut self, profile: Option<&str>) -> Result<Self> {
        let Some(name) = profile else {
            return Ok(self);
        };
        let Some(overrides) = self.profiles.get(name).cloned() else {
            return Err(ConfigError::ProfileNotFound(name.to_string()));
        };
        tracing::debug!("Applying profile '{}'", name);

        if !overrides.bundle.is_null() {
            self.bundle = merged(&self.bundle, &overrides.bundle)?;
        }

        if !overrides.dev.is_null() {
            let base = self.dev.take().unwrap_or_default();
            self.dev = Some(merged(&base, &overrides.dev)?);
        }

        if !overrides.settings.is_null() {
            self.settings = merged(&self.settings, &overrides.settings)?;
        }

        Ok(self)
    }

    /// The dev section, or its defaults when the file has none.
    pub fn dev(&self) -> DevConfig {
        self.dev.clone().unwrap_or_default()
    }

    /// Bundler options for this config. Relative paths resolve against
    /// `base`, normally the directory the config was loaded from.
    pub fn to_bundler_options(&self, base: &Path) -> BundlerOptions {
        let bundle = &self.bundle;
        let root = match &bundle.root_dir {
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        };

        let mut options = BundlerOptions::new(bundle.entries.iter().cloned())
            .root_dir(root)
            .out_dir(bundle.out_dir.clone())
            .cache_dir(bundle.cache_dir.clone())
            .cache(bundle.cache)
            .minify(bundle.minify)
            .public_url(bundle.public_url.clone())
            .production(bundle.production)
            .hmr(bundle.hmr);

        if let Some(extensions) = &bundle.extensions {
            options = options.extensions(extensions.iter().cloned());
        }
        if let Some(workers) = bundle.workers {
            options = options.workers(workers);
        }

        let dev = self.dev();
        options.hmr_path = dev.hmr_path;
        options.hmr_hostname = dev.hmr_hostname;
        options.hmr_port = dev.hmr_port;
        options
    }
}

fn merged<T>(base: &T, update: &Value) -> Result<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(base).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })?;
    merge_values(&mut value, update);
    serde_json::from_value(value).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })
}

fn merge_values(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_values(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target_slot, _) => {
            *target_slot = update.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn to_value_skips_unset_sections() {
        let mut config = SatchelConfig::default();
        config.bundle.entries = vec![PathBuf::from("index.js")];

        let value = config.to_value().unwrap();
        assert_eq!(value["bundle"]["out_dir"], json!("dist"));
        assert!(value.get("dev").is_none());
        assert!(value.get("profiles").is_none());
    }

    #[test]
    fn profile_merging_keeps_unmentioned_keys() {
        let config = SatchelConfig::from_value(json!({
            "bundle": { "entries": ["index.js"], "minify": false, "out_dir": "build" },
            "profiles": {
                "production": { "bundle": { "minify": true, "production": true } }
            }
        }))
        .unwrap()
        .materialize_profile(Some("production"))
        .unwrap();

        assert!(config.bundle.minify);
        assert!(config.bundle.production);
        assert_eq!(config.bundle.out_dir, PathBuf::from("build"));
        assert_eq!(config.bundle.entries, vec![PathBuf::from("index.js")]);
    }

    #[test]
    fn profile_arrays_replace_base_arrays() {
        let config = SatchelConfig::from_value(json!({
            "bundle": { "entries": ["a.js", "b.js"] },
            "profiles": { "single": { "bundle": { "entries": ["c.js"] } } }
        }))
        .unwrap()
        .materialize_profile(Some("single"))
        .unwrap();

        assert_eq!(config.bundle.entries, vec![PathBuf::from("c.js")]);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let err = SatchelConfig::default()
            .materialize_profile(Some("staging"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound(name) if name == "staging"));
    }

    #[test]
    fn profile_with_mistyped_value_is_rejected() {
        let err = SatchelConfig::from_value(json!({
            "profiles": { "bad": { "bundle": { "minify": "yes" } } }
        }))
        .unwrap()
        .materialize_profile(Some("bad"))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProfileOverride { .. }));
    }

    #[test]
    fn bundler_options_resolve_against_base() {
        let config = SatchelConfig::from_value(json!({
            "bundle": {
                "entries": ["src/index.html"],
                "root_dir": "web",
                "public_url": "/static",
                "workers": 3,
                "extensions": [".ts", "js"]
            },
            "dev": { "hmr_port": 4000 }
        }))
        .unwrap();

        let options = config.to_bundler_options(Path::new("/project"));
        assert_eq!(options.root_dir, PathBuf::from("/project/web"));
        assert_eq!(options.entries, vec![PathBuf::from("src/index.html")]);
        assert_eq!(options.public_url, "/static/");
        assert_eq!(options.workers, 3);
        assert_eq!(options.extensions, vec!["ts", "js"]);
        assert_eq!(options.hmr_port, Some(4000));
        assert_eq!(options.hmr_path, "/__satchel_hmr__");
    }
}

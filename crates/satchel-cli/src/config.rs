//! Configuration loading for CLI commands.
//!
//! Priority: CLI args > `SATCHEL_` environment variables > config file
//! (with the selected profile applied) > defaults.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::Serialize;

use satchel_bundler::BundlerOptions;
use satchel_config::{
    ConfigDiscovery, ConfigError, ConfigValidator, FsValidator, SatchelConfig, load_from,
};

use crate::cli::{BundleArgs, Cli, Command};
use crate::error::Result;

/// Prefix of configuration environment variables. Nested keys are separated
/// by a double underscore: `SATCHEL_BUNDLE__OUT_DIR=build`.
pub const ENV_PREFIX: &str = "SATCHEL_";

/// A loaded, validated configuration and the directory it is relative to.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: SatchelConfig,
    /// Directory relative config paths resolve against.
    pub base: PathBuf,
    /// The config file, if one was found.
    pub source: Option<PathBuf>,
}

impl Project {
    /// Load the configuration for `cli`, run from `cwd`.
    pub fn load(cli: &Cli, cwd: &Path) -> Result<Self> {
        let overrides = Overrides::from_command(&cli.command, cwd);
        Self::load_with(cli.config.as_deref(), cli.profile.as_deref(), &overrides, cwd)
    }

    pub fn load_with(
        config_path: Option<&Path>,
        profile: Option<&str>,
        overrides: &Overrides,
        cwd: &Path,
    ) -> Result<Self> {
        let source = match config_path {
            Some(path) => {
                let path = cwd.join(path);
                if !path.is_file() {
                    return Err(ConfigError::InvalidValue {
                        field: "--config".to_string(),
                        hint: Some(format!("{} does not exist", path.display())),
                    }
                    .into());
                }
                Some(path)
            }
            None => ConfigDiscovery::new(cwd).find(),
        };

        let file_config = match &source {
            Some(path) => load_from(path)?,
            None => SatchelConfig::default(),
        };
        let mut file_config = file_config.materialize_profile(profile)?;
        file_config.profiles.clear();

        let config: SatchelConfig = Figment::new()
            .merge(Serialized::defaults(file_config))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|e| ConfigError::InvalidValue {
                field: "configuration".to_string(),
                hint: Some(e.to_string()),
            })?;

        let base = source
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        FsValidator::new(&base).validate(&config)?;
        tracing::debug!(
            "Loaded configuration from {}",
            source
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string())
        );

        Ok(Self {
            config,
            base,
            source,
        })
    }

    pub fn bundler_options(&self) -> BundlerOptions {
        self.config.to_bundler_options(&self.base)
    }
}

/// Values set on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    pub bundle: BundleOverrides,
    #[serde(skip_serializing_if = "DevOverrides::is_empty")]
    pub dev: DevOverrides,
}

#[derive(Debug, Default, Serialize)]
pub struct BundleOverrides {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct DevOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmr_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmr_port: Option<u16>,
}

impl DevOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.hmr_hostname.is_none()
            && self.hmr_port.is_none()
    }
}

impl Overrides {
    /// Overrides for `command`. Paths are made absolute against `cwd`, so
    /// they keep pointing where the user typed them wherever the config lives.
    pub fn from_command(command: &Command, cwd: &Path) -> Self {
        let mut overrides = Self {
            bundle: BundleOverrides::from_args(command.bundle_args(), cwd),
            dev: DevOverrides::default(),
        };

        match command {
            Command::Build(args) => {
                overrides.bundle.production = Some(true);
                overrides.bundle.minify = Some(!args.no_minify);
                overrides.bundle.hmr = Some(false);
            }
            Command::Watch(args) => {
                overrides.bundle.hmr = Some(true);
                overrides.dev.hmr_port = args.hmr_port;
                overrides.dev.hmr_hostname = args.hmr_hostname.clone();
            }
            Command::Serve(args) => {
                overrides.bundle.hmr = Some(true);
                overrides.dev.host = args.host.clone();
                overrides.dev.port = args.port;
            }
        }
        overrides
    }
}

impl BundleOverrides {
    fn from_args(args: &BundleArgs, cwd: &Path) -> Self {
        Self {
            entries: args.entries.iter().map(|entry| cwd.join(entry)).collect(),
            out_dir: args.out_dir.as_ref().map(|dir| cwd.join(dir)),
            cache_dir: args.cache_dir.as_ref().map(|dir| cwd.join(dir)),
            cache: args.no_cache.then_some(false),
            public_url: args.public_url.clone(),
            workers: args.workers,
            ..Self::default()
        }
    }
}

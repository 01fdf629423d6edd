//! Configuration for the satchel bundler.
//!
//! A project is configured through `satchel.toml` or the `satchel` field of
//! `package.json`. The file is deserialized into [`SatchelConfig`], a named
//! profile can be merged over it, and the result is validated and turned into
//! the bundler's [`BundlerOptions`](satchel_bundler::BundlerOptions).

pub mod bundle;
pub mod config;
pub mod dev;
pub mod discovery;
pub mod error;
pub mod settings;
pub mod validation;

pub use bundle::BundleOptions;
pub use config::{ProfileConfig, SatchelConfig};
pub use dev::DevConfig;
pub use error::{ConfigError, Result};
pub use settings::GlobalSettings;

pub use discovery::{
    CONFIG_FILE, ConfigDiscovery, PACKAGE_FIELD, discover, discover_with_profile, load_from,
};
pub use validation::{
    ConfigValidator, FsValidator, SchemaValidator, validate_fs, validate_schema,
};

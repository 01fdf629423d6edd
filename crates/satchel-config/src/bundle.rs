//! The `[bundle]` table: what to build and where to put it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleOptions {
    /// Entry files, relative to the root directory.
    #[serde(default)]
    pub entries: Vec<PathBuf>,

    /// Project root. Defaults to the directory the config was found in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Reuse processed assets across runs.
    #[serde(default = "default_true")]
    pub cache: bool,

    #[serde(default)]
    pub minify: bool,

    /// URL prefix the output directory is served under.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Inline `process.env.NODE_ENV` as `"production"`.
    #[serde(default)]
    pub production: bool,

    /// Embed the live-update runtime in script bundles.
    #[serde(default)]
    pub hmr: bool,

    /// Resolver extensions. The bundler's list is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    /// Worker threads. One per core when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            root_dir: None,
            out_dir: default_out_dir(),
            cache_dir: default_cache_dir(),
            cache: true,
            minify: false,
            public_url: default_public_url(),
            production: false,
            hmr: false,
            extensions: None,
            workers: None,
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".satchel-cache")
}

fn default_public_url() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

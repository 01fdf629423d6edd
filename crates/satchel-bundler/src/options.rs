//! Normalized bundler options shared by every component of a session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::cache::CACHE_FORMAT_VERSION;

/// Default resolver extension list, tried after the parent's own extension.
pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "json", "css", "html"];

/// Default path of the live-update event stream.
pub const DEFAULT_HMR_PATH: &str = "/__satchel_hmr__";

/// Options for a bundling session.
///
/// Built once at session start and shared immutably (behind an `Arc`) by the
/// resolver, cache, workers and packagers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundlerOptions {
    /// Entry files, relative to `root_dir` unless absolute.
    pub entries: Vec<PathBuf>,
    /// Project root. Absolute specifiers (`/x`) fall back to this directory.
    pub root_dir: PathBuf,
    /// Output directory for packaged bundles.
    pub out_dir: PathBuf,
    /// Directory holding the per-asset cache files.
    pub cache_dir: PathBuf,
    /// Whether the persistent asset cache is used.
    pub cache: bool,
    /// Collapse whitespace in stylesheets and use the compact script prelude.
    pub minify: bool,
    /// URL prefix under which `out_dir` is served. Always ends with `/`.
    pub public_url: String,
    /// Enable live updates (HMR runtime in script bundles, reload stubs for CSS).
    pub hmr: bool,
    /// Hostname the HMR runtime connects to. `None` uses the page's host.
    pub hmr_hostname: Option<String>,
    /// Port the HMR runtime connects to. `None` uses the page's port.
    pub hmr_port: Option<u16>,
    /// Path of the live-update event stream.
    pub hmr_path: String,
    /// Production builds inline `process.env.NODE_ENV` as `"production"`.
    pub production: bool,
    /// Extensions tried by the resolver, without the leading dot.
    pub extensions: Vec<String>,
    /// Number of worker threads.
    pub workers: usize,
    /// Builtin loader module per bundle type, used for deferred bundle loading.
    pub bundle_loaders: BTreeMap<String, String>,
}

impl Default for BundlerOptions {
    fn default() -> Self {
        let mut bundle_loaders = BTreeMap::new();
        bundle_loaders.insert("js".to_string(), crate::builtins::JS_LOADER.to_string());
        bundle_loaders.insert("css".to_string(), crate::builtins::CSS_LOADER.to_string());

        Self {
            entries: Vec::new(),
            root_dir: PathBuf::from("."),
            out_dir: PathBuf::from("dist"),
            cache_dir: PathBuf::from(".satchel-cache"),
            cache: true,
            minify: false,
            public_url: "/".to_string(),
            hmr: false,
            hmr_hostname: None,
            hmr_port: None,
            hmr_path: DEFAULT_HMR_PATH.to_string(),
            production: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            workers: num_cpus::get().max(1),
            bundle_loaders,
        }
    }
}

impl BundlerOptions {
    /// Create options for the given entry files.
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = dir.into();
        self
    }

    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn minify(mut self, enabled: bool) -> Self {
        self.minify = enabled;
        self
    }

    /// Set the public URL prefix. A trailing `/` is appended when missing.
    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.public_url = url;
        self
    }

    pub fn hmr(mut self, enabled: bool) -> Self {
        self.hmr = enabled;
        self
    }

    pub fn hmr_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hmr_hostname = Some(hostname.into());
        self
    }

    pub fn hmr_port(mut self, port: u16) -> Self {
        self.hmr_port = Some(port);
        self
    }

    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Resolve `root_dir`, `out_dir` and `cache_dir` against the current directory
    /// and entries against `root_dir`.
    pub fn normalized(mut self) -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        self.root_dir = absolutize(&cwd, &self.root_dir);
        self.out_dir = absolutize(&self.root_dir, &self.out_dir);
        self.cache_dir = absolutize(&self.root_dir, &self.cache_dir);
        self.entries = self
            .entries
            .iter()
            .map(|entry| absolutize(&self.root_dir, entry))
            .collect();
        Ok(self)
    }

    /// Hash of every option that changes generated output, folded with the crate
    /// and cache format versions.
    ///
    /// Used as the namespace for cache file names: changing any of these options
    /// or upgrading satchel makes every previous entry unreachable.
    pub fn cache_key(&self) -> String {
        let mut hasher = Hasher::new();

        hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(b"\0");

        hasher.update(&[self.minify as u8, self.hmr as u8, self.production as u8]);
        hasher.update(self.public_url.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.root_dir.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.hmr_path.as_bytes());
        hasher.update(b"\0");

        // BTreeMap iteration is already sorted
        for (bundle_type, loader) in &self.bundle_loaders {
            hasher.update(bundle_type.as_bytes());
            hasher.update(b"=");
            hasher.update(loader.as_bytes());
            hasher.update(b"\0");
        }

        hasher.finalize().to_hex().to_string()
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    path_clean::clean(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_gets_trailing_slash() {
        let options = BundlerOptions::default().public_url("/static");
        assert_eq!(options.public_url, "/static/");
    }

    #[test]
    fn cache_key_tracks_output_affecting_options() {
        let base = BundlerOptions::new(["index.js"]);
        let same = BundlerOptions::new(["other.js"]).workers(3);
        assert_eq!(base.cache_key(), same.cache_key());

        assert_ne!(base.cache_key(), base.clone().minify(true).cache_key());
        assert_ne!(base.cache_key(), base.clone().hmr(true).cache_key());
        assert_ne!(
            base.cache_key(),
            base.clone().public_url("/cdn/").cache_key()
        );
    }

    #[test]
    fn extensions_strip_leading_dots() {
        let options = BundlerOptions::default().extensions([".ts", "js"]);
        assert_eq!(options.extensions, vec!["ts", "js"]);
    }

    #[test]
    fn normalized_makes_paths_absolute() {
        let options = BundlerOptions::new(["src/index.js"])
            .root_dir("/project")
            .out_dir("dist")
            .normalized()
            .unwrap();
        assert_eq!(options.out_dir, PathBuf::from("/project/dist"));
        assert_eq!(options.entries, vec![PathBuf::from("/project/src/index.js")]);
    }
}

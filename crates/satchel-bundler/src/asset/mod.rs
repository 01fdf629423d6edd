//! The per-file asset lifecycle.
//!
//! Every source file becomes an [`Asset`] chosen by extension through the
//! [`AssetRegistry`]. A worker drives it through [`process`]:
//!
//! 1. **load** reads the source through the [`Runtime`]
//! 2. **parse** builds structure, lazily and at most once
//! 3. **collect_dependencies** records dependency edges and rewrites URL references
//! 4. **pretransform** / **transform** apply structural rewrites
//! 5. **generate** renders one output string per output type
//!
//! The result is a [`ProcessedAsset`], the serializable unit stored in the
//! cache and shipped back from workers.

mod css;
mod dialect;
mod html;
mod js;
mod json;
mod raw;
mod registry;

pub use css::CssAsset;
pub use dialect::{DialectAsset, SourceTransform};
pub use html::HtmlAsset;
pub use js::JsAsset;
pub use json::JsonAsset;
pub use raw::RawAsset;
pub use registry::{AssetConstructor, AssetRegistry};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostics::{SourceLoc, code_frame, line_column};
use crate::naming;
use crate::options::BundlerOptions;
use crate::resolver::PackageDescriptor;
use crate::runtime::Runtime;

/// Output type of generated content, also the type of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetType {
    Js,
    Css,
    Html,
    /// Any other extension, copied through by the raw packager.
    Other(String),
}

impl AssetType {
    pub fn as_str(&self) -> &str {
        match self {
            AssetType::Js => "js",
            AssetType::Css => "css",
            AssetType::Html => "html",
            AssetType::Other(ext) => ext,
        }
    }

    /// Type of a file by its extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| AssetType::from(e.to_ascii_lowercase()))
            .unwrap_or_else(|| AssetType::Other(String::new()))
    }
}

impl From<&str> for AssetType {
    fn from(value: &str) -> Self {
        match value {
            "js" => AssetType::Js,
            "css" => AssetType::Css,
            "html" => AssetType::Html,
            other => AssetType::Other(other.to_string()),
        }
    }
}

impl From<String> for AssetType {
    fn from(value: String) -> Self {
        AssetType::from(value.as_str())
    }
}

impl From<AssetType> for String {
    fn from(value: AssetType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated output of one asset, keyed by output type.
pub type Generated = BTreeMap<AssetType, String>;

/// A dependency edge declared by an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// The specifier as written in the source.
    pub specifier: String,
    /// Dynamic dependencies start a new child bundle.
    pub dynamic: bool,
    #[serde(default)]
    pub meta: DependencyMeta,
}

/// Extra information carried by a [`Dependency`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMeta {
    /// The dependency is a URL reference (`url()`, `src=`, `new URL()`).
    pub is_url: bool,
    /// Absolute target of a URL reference, resolved against the referencing file.
    pub url_target: Option<PathBuf>,
    /// A `require` inside a `try` block; failing to resolve it is not an error.
    pub optional: bool,
    /// Position of the specifier in the source.
    pub loc: Option<SourceLoc>,
}

impl Dependency {
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            dynamic: false,
            meta: DependencyMeta::default(),
        }
    }

    /// A dependency that starts a new child bundle.
    pub fn dynamic(specifier: impl Into<String>) -> Self {
        Self {
            dynamic: true,
            ..Self::new(specifier)
        }
    }

    /// A URL reference to `target`. URL references are always dynamic.
    pub fn url(specifier: impl Into<String>, target: PathBuf) -> Self {
        let mut dep = Self::dynamic(specifier);
        dep.meta.is_url = true;
        dep.meta.url_target = Some(target);
        dep
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.meta.optional = optional;
        self
    }

    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.meta.loc = Some(loc);
        self
    }
}

/// Everything a worker produces for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedAsset {
    /// Primary output type of the asset.
    pub asset_type: AssetType,
    pub dependencies: Vec<Dependency>,
    pub generated: Generated,
    /// Hash of `generated`, used for change detection and bundle hashes.
    pub hash: String,
}

impl ProcessedAsset {
    /// Generated output of the given type.
    pub fn output(&self, asset_type: &AssetType) -> Option<&str> {
        self.generated.get(asset_type).map(String::as_str)
    }
}

/// Failure in one of the lifecycle steps.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{}: {message}", path.display())]
pub struct AssetError {
    pub path: PathBuf,
    pub message: String,
    pub loc: Option<SourceLoc>,
    pub code_frame: Option<String>,
}

impl AssetError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            loc: None,
            code_frame: None,
        }
    }

    /// Attach the position of byte `offset` in `source` and a code frame around it.
    pub fn at_offset(mut self, source: &str, offset: usize) -> Self {
        let loc = line_column(source, offset);
        self.loc = Some(loc);
        self.code_frame = Some(code_frame(source, loc));
        self
    }
}

/// Structure state of an asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseState {
    #[default]
    Unparsed,
    Parsed,
    /// Structure was rewritten and must be regenerated.
    Dirty,
}

impl ParseState {
    pub fn is_parsed(self) -> bool {
        self != ParseState::Unparsed
    }

    pub fn mark_dirty(&mut self) {
        *self = ParseState::Dirty;
    }
}

/// Shared, read-only inputs to a lifecycle run.
#[derive(Clone, Copy)]
pub struct AssetContext<'a> {
    /// Absolute path of the asset.
    pub path: &'a Path,
    pub options: &'a BundlerOptions,
    /// Package that owns the asset.
    pub package: Option<&'a PackageDescriptor>,
    pub runtime: &'a dyn Runtime,
    pub registry: &'a AssetRegistry,
}

impl AssetContext<'_> {
    /// Read the asset source as UTF-8 text.
    pub fn read_source(&self) -> Result<String, AssetError> {
        self.runtime
            .read_to_string(self.path)
            .map_err(|e| AssetError::new(self.path, e.to_string()))
    }

    /// Absolute target of a URL reference found in this asset, or `None` for
    /// references that point outside the project (remote, data, fragment).
    pub fn url_target(&self, url: &str) -> Option<PathBuf> {
        if is_external_url(url) {
            return None;
        }

        let url = url.split(['?', '#']).next().unwrap_or(url);
        if url.is_empty() {
            return None;
        }

        let base = if url.starts_with('/') {
            self.options.root_dir.clone()
        } else {
            self.path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.options.root_dir.clone())
        };
        Some(path_clean::clean(base.join(url.trim_start_matches('/'))))
    }

    /// Public URL of the bundle a URL reference to `target` ends up in.
    pub fn public_url_for(&self, target: &Path) -> String {
        let output = self.registry.output_type(target);
        format!(
            "{}{}",
            self.options.public_url,
            naming::url_bundle_name(target, &self.options.root_dir, &output)
        )
    }

    /// Value of `process.env.NODE_ENV` inlined into scripts.
    pub fn node_env(&self) -> &'static str {
        if self.options.production {
            "production"
        } else {
            "development"
        }
    }
}

/// Whether a URL reference points outside the project.
pub fn is_external_url(url: &str) -> bool {
    const SCHEMES: &[&str] = &["data:", "mailto:", "tel:", "javascript:", "#"];

    let url = url.trim();
    url.is_empty()
        || url.starts_with("//")
        || url.contains("://")
        || SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// One file moving through the lifecycle.
///
/// Implementations keep their parsed structure private; the only thing that
/// leaves a worker is the [`ProcessedAsset`] built by [`process`].
pub trait Asset: Send {
    /// Primary output type.
    fn asset_type(&self) -> AssetType;

    /// Current source text.
    fn source(&self) -> &str;

    /// Replace the source text and drop any parsed structure.
    fn set_source(&mut self, source: String);

    fn load(&mut self, cx: &AssetContext<'_>) -> Result<(), AssetError> {
        let source = cx.read_source()?;
        self.set_source(source);
        Ok(())
    }

    /// Types without meaningful structure return `false` and are never parsed.
    fn needs_parse(&self) -> bool {
        true
    }

    fn parse_state(&self) -> ParseState;

    fn parse(&mut self, cx: &AssetContext<'_>) -> Result<(), AssetError>;

    fn collect_dependencies(&mut self, cx: &AssetContext<'_>)
    -> Result<Vec<Dependency>, AssetError>;

    fn pretransform(&mut self, _cx: &AssetContext<'_>) -> Result<(), AssetError> {
        Ok(())
    }

    fn transform(&mut self, _cx: &AssetContext<'_>) -> Result<(), AssetError> {
        Ok(())
    }

    fn generate(&mut self, cx: &AssetContext<'_>) -> Result<Generated, AssetError>;
}

/// Run the full lifecycle of one asset.
pub fn process(asset: &mut dyn Asset, cx: &AssetContext<'_>) -> Result<ProcessedAsset, AssetError> {
    asset.load(cx)?;

    ensure_parsed(asset, cx)?;
    let dependencies = asset.collect_dependencies(cx)?;

    asset.pretransform(cx)?;
    ensure_parsed(asset, cx)?;
    asset.transform(cx)?;

    let generated = asset.generate(cx)?;
    let hash = hash_generated(&generated);

    Ok(ProcessedAsset {
        asset_type: asset.asset_type(),
        dependencies,
        generated,
        hash,
    })
}

fn ensure_parsed(asset: &mut dyn Asset, cx: &AssetContext<'_>) -> Result<(), AssetError> {
    if asset.needs_parse() && !asset.parse_state().is_parsed() {
        asset.parse(cx)?;
    }
    Ok(())
}

/// Content hash over every generated output.
pub fn hash_generated(generated: &Generated) -> String {
    let mut hasher = blake3::Hasher::new();
    for (asset_type, content) in generated {
        hasher.update(asset_type.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(&(content.len() as u64).to_le_bytes());
        hasher.update(content.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::runtime::MemoryRuntime;

    /// Run the lifecycle of `path` against an in-memory filesystem.
    pub(crate) fn run(
        runtime: &MemoryRuntime,
        options: &BundlerOptions,
        path: &str,
    ) -> Result<ProcessedAsset, AssetError> {
        let registry = AssetRegistry::new();
        let path = Path::new(path);
        let cx = AssetContext {
            path,
            options,
            package: None,
            runtime,
            registry: &registry,
        };
        let mut asset = registry.create(path);
        process(asset.as_mut(), &cx)
    }

    pub(crate) fn options() -> BundlerOptions {
        BundlerOptions::new(["/app/index.js"]).root_dir("/app")
    }
}

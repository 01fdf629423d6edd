use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{
    Asset, AssetType, CssAsset, DialectAsset, HtmlAsset, JsAsset, JsonAsset, RawAsset,
    SourceTransform,
};

/// Builds a fresh asset for a path.
pub type AssetConstructor = Arc<dyn Fn(&Path) -> Box<dyn Asset> + Send + Sync>;

#[derive(Clone)]
struct AssetKind {
    output: AssetType,
    construct: AssetConstructor,
}

/// Maps file extensions to asset types.
///
/// Unknown extensions fall back to [`RawAsset`]. Cloning is cheap; every
/// worker thread holds its own clone.
#[derive(Clone)]
pub struct AssetRegistry {
    kinds: FxHashMap<String, AssetKind>,
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AssetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<_> = self.kinds.keys().collect();
        extensions.sort();
        f.debug_struct("AssetRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

impl AssetRegistry {
    /// Registry with the built-in script, stylesheet, document and JSON types.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(&["js", "mjs", "cjs", "jsx"], AssetType::Js, |path| {
            Box::new(JsAsset::new(path))
        });
        registry.register(&["json"], AssetType::Js, |path| {
            Box::new(JsonAsset::new(path))
        });
        registry.register(&["css"], AssetType::Css, |_| Box::new(CssAsset::new()));
        registry.register(&["html", "htm"], AssetType::Html, |_| {
            Box::new(HtmlAsset::new())
        });
        registry
    }

    /// Registry without any registered types; everything is raw.
    pub fn empty() -> Self {
        Self {
            kinds: FxHashMap::default(),
        }
    }

    /// Register a constructor for the given extensions (without dots).
    pub fn register<F>(&mut self, extensions: &[&str], output: AssetType, construct: F)
    where
        F: Fn(&Path) -> Box<dyn Asset> + Send + Sync + 'static,
    {
        let construct: AssetConstructor = Arc::new(construct);
        for ext in extensions {
            self.kinds.insert(
                ext.trim_start_matches('.').to_ascii_lowercase(),
                AssetKind {
                    output: output.clone(),
                    construct: Arc::clone(&construct),
                },
            );
        }
    }

    /// Register a source dialect: files with `extension` are rewritten by
    /// `transform` and then processed like files with `inner_extension`.
    pub fn register_dialect(
        &mut self,
        extension: &str,
        inner_extension: &str,
        transform: Arc<dyn SourceTransform>,
    ) {
        let inner = self.kind(inner_extension);
        let output = inner.output.clone();
        self.register(&[extension], output, move |path| {
            Box::new(DialectAsset::new(
                Arc::clone(&transform),
                (inner.construct)(path),
            ))
        });
    }

    /// Create the asset for `path`.
    pub fn create(&self, path: &Path) -> Box<dyn Asset> {
        let ext = extension(path);
        match self.kinds.get(&ext) {
            Some(kind) => (kind.construct)(path),
            None => Box::new(RawAsset::new(path)),
        }
    }

    /// Primary output type of the asset `path` would become.
    pub fn output_type(&self, path: &Path) -> AssetType {
        let ext = extension(path);
        match self.kinds.get(&ext) {
            Some(kind) => kind.output.clone(),
            None => AssetType::Other(ext),
        }
    }

    /// Whether `path` has a registered (non-raw) type.
    pub fn is_registered(&self, path: &Path) -> bool {
        self.kinds.contains_key(&extension(path))
    }

    fn kind(&self, ext: &str) -> AssetKind {
        self.kinds.get(ext).cloned().unwrap_or_else(|| AssetKind {
            output: AssetType::Other(ext.to_string()),
            construct: Arc::new(|path: &Path| Box::new(RawAsset::new(path)) as Box<dyn Asset>),
        })
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

//! Memoized dependency resolution.
//!
//! Maps a specifier plus an optional parent file to an absolute path and the
//! package descriptor of the package that owns it. Every successful result is
//! cached by `(parent directory, specifier)` for the lifetime of the
//! [`Resolver`], and the synchronous and asynchronous entry points share that
//! table.

mod package;

pub use package::PackageDescriptor;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::options::BundlerOptions;
use crate::runtime::Runtime;
use crate::{Error, Result};

/// A resolved dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Absolute path of the resolved file.
    pub path: PathBuf,
    /// Nearest package.json enclosing `path`.
    pub package: Option<Arc<PackageDescriptor>>,
}

type ResolutionKey = (PathBuf, String);

/// Resolver with a process-lifetime memo table.
///
/// Cloning is cheap and clones share the same tables.
#[derive(Debug, Clone)]
pub struct Resolver {
    runtime: Arc<dyn Runtime>,
    options: Arc<BundlerOptions>,
    cache: Arc<RwLock<FxHashMap<ResolutionKey, Arc<Resolution>>>>,
    packages: Arc<RwLock<FxHashMap<PathBuf, Option<Arc<PackageDescriptor>>>>>,
}

impl Resolver {
    pub fn new(runtime: Arc<dyn Runtime>, options: Arc<BundlerOptions>) -> Self {
        Self {
            runtime,
            options,
            cache: Arc::new(RwLock::new(FxHashMap::default())),
            packages: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Resolve `specifier` relative to `parent` (or the project root when `None`).
    ///
    /// Returns the memoized result when the `(parent directory, specifier)` pair
    /// was resolved before, without touching the filesystem.
    pub fn resolve_sync(&self, specifier: &str, parent: Option<&Path>) -> Result<Arc<Resolution>> {
        let key = self.key(specifier, parent);
        if let Some(hit) = self.cache.read().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let resolution = self.resolve_uncached(specifier, parent, &key.0)?;

        // Keep whichever result landed first so concurrent misses agree
        let mut cache = self.cache.write();
        Ok(Arc::clone(
            cache.entry(key).or_insert_with(|| Arc::new(resolution)),
        ))
    }

    /// Asynchronous variant of [`resolve_sync`](Self::resolve_sync).
    ///
    /// Cache hits return immediately; misses probe the filesystem on the blocking
    /// pool and populate the same table.
    pub async fn resolve(&self, specifier: &str, parent: Option<&Path>) -> Result<Arc<Resolution>> {
        let key = self.key(specifier, parent);
        if let Some(hit) = self.cache.read().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let resolver = self.clone();
        let specifier = specifier.to_string();
        let parent = parent.map(Path::to_path_buf);
        tokio::task::spawn_blocking(move || resolver.resolve_sync(&specifier, parent.as_deref()))
            .await
            .map_err(|e| Error::Worker(format!("resolver task failed: {e}")))?
    }

    /// Descriptor of the nearest package.json at or above `dir`.
    pub fn package_for(&self, dir: &Path) -> Option<Arc<PackageDescriptor>> {
        let mut visited = Vec::new();
        let mut found = None;

        for candidate in dir.ancestors() {
            if let Some(known) = self.packages.read().get(candidate) {
                found = known.clone();
                break;
            }
            visited.push(candidate.to_path_buf());

            if let Some(descriptor) = PackageDescriptor::read(self.runtime.as_ref(), candidate) {
                found = Some(Arc::new(descriptor));
                break;
            }
        }

        let mut packages = self.packages.write();
        for dir in visited {
            packages.entry(dir).or_insert_with(|| found.clone());
        }
        found
    }

    /// Drop memoized resolutions that point at `path`, e.g. after it was deleted.
    pub fn forget(&self, path: &Path) {
        self.cache.write().retain(|_, resolution| resolution.path != path);
    }

    /// Number of memoized resolutions.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    fn key(&self, specifier: &str, parent: Option<&Path>) -> ResolutionKey {
        let dir = parent
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.options.root_dir.clone());
        (dir, specifier.to_string())
    }

    fn resolve_uncached(
        &self,
        specifier: &str,
        parent: Option<&Path>,
        parent_dir: &Path,
    ) -> Result<Resolution> {
        let not_found = || Error::Resolution {
            specifier: specifier.to_string(),
            from: parent
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.options.root_dir.clone()),
            code_frame: None,
        };

        let cleaned = strip_query(specifier);
        if cleaned.is_empty() {
            return Err(not_found());
        }

        // Glob specifiers enumerate assets; they are joined, never probed
        if is_glob(cleaned) {
            return Ok(Resolution {
                path: path_clean::clean(parent_dir.join(cleaned)),
                package: None,
            });
        }

        let extensions = self.extensions_for(parent);
        let path = match classify(cleaned) {
            SpecifierKind::Relative => self.load(&parent_dir.join(cleaned), &extensions),
            SpecifierKind::Absolute => {
                let absolute = Path::new(cleaned);
                self.load(absolute, &extensions).or_else(|| {
                    let rooted = self.options.root_dir.join(cleaned.trim_start_matches('/'));
                    self.load(&rooted, &extensions)
                })
            }
            SpecifierKind::Tilde => {
                let base = self.package_root(parent_dir);
                self.load(&base.join(&cleaned[2..]), &extensions)
            }
            SpecifierKind::Bare => parent_dir.ancestors().find_map(|dir| {
                let candidate = dir.join("node_modules").join(cleaned);
                self.load(&candidate, &extensions)
            }),
        }
        .ok_or_else(not_found)?;

        let path = path_clean::clean(path);
        let package = path.parent().and_then(|dir| self.package_for(dir));
        Ok(Resolution { path, package })
    }

    /// Parent's extension first, then the configured list without duplicates.
    fn extensions_for(&self, parent: Option<&Path>) -> Vec<String> {
        let mut extensions = Vec::with_capacity(self.options.extensions.len() + 1);
        if let Some(ext) = parent.and_then(Path::extension).and_then(|e| e.to_str()) {
            extensions.push(ext.to_string());
        }
        for ext in &self.options.extensions {
            if !extensions.contains(ext) {
                extensions.push(ext.clone());
            }
        }
        extensions
    }

    fn load(&self, path: &Path, extensions: &[String]) -> Option<PathBuf> {
        self.load_as_file(path, extensions)
            .or_else(|| self.load_as_directory(path, extensions))
    }

    fn load_as_file(&self, path: &Path, extensions: &[String]) -> Option<PathBuf> {
        if self.runtime.is_file(path) {
            return Some(path.to_path_buf());
        }

        extensions.iter().find_map(|ext| {
            let candidate = with_appended_extension(path, ext);
            self.runtime.is_file(&candidate).then_some(candidate)
        })
    }

    fn load_as_directory(&self, dir: &Path, extensions: &[String]) -> Option<PathBuf> {
        if !self.runtime.is_dir(dir) {
            return None;
        }

        if let Some(entry) = self.package_entry(dir) {
            let target = dir.join(&entry);
            let found = self.load_as_file(&target, extensions).or_else(|| {
                self.runtime
                    .is_dir(&target)
                    .then(|| self.load_as_file(&target.join("index"), extensions))
                    .flatten()
            });
            if found.is_some() {
                return found;
            }
        }

        self.load_as_file(&dir.join("index"), extensions)
    }

    fn package_entry(&self, dir: &Path) -> Option<String> {
        let descriptor = match self.packages.read().get(dir) {
            Some(known) => known.clone(),
            None => None,
        };
        let descriptor = descriptor.or_else(|| {
            let read = PackageDescriptor::read(self.runtime.as_ref(), dir).map(Arc::new);
            if read.is_some() {
                self.packages.write().insert(dir.to_path_buf(), read.clone());
            }
            read
        })?;
        descriptor.entry().map(str::to_string)
    }

    /// Nearest directory at or above `dir` that contains node_modules.
    fn package_root(&self, dir: &Path) -> PathBuf {
        dir.ancestors()
            .find(|candidate| self.runtime.is_dir(&candidate.join("node_modules")))
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.options.root_dir.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecifierKind {
    Relative,
    Absolute,
    Tilde,
    Bare,
}

fn classify(specifier: &str) -> SpecifierKind {
    if specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
    {
        SpecifierKind::Relative
    } else if specifier.starts_with('/') {
        SpecifierKind::Absolute
    } else if specifier.starts_with("~/") {
        SpecifierKind::Tilde
    } else {
        SpecifierKind::Bare
    }
}

/// Whether the specifier uses glob syntax.
pub fn is_glob(specifier: &str) -> bool {
    specifier.contains(['*', '?', '{', '['])
}

fn strip_query(specifier: &str) -> &str {
    let end = specifier.find(['?', '#']).unwrap_or(specifier.len());
    &specifier[..end]
}

fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

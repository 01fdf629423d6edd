use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;

use super::{Runtime, RuntimeError, RuntimeResult};

/// In-memory [`Runtime`] for tests and embedders with virtual files.
///
/// Directories are implied by the files stored beneath them. Every `is_file` /
/// `is_dir` call is counted so callers can assert how often the filesystem
/// was probed.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    files: RwLock<BTreeMap<PathBuf, (Vec<u8>, SystemTime)>>,
    probes: AtomicUsize,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files
            .write()
            .insert(path.into(), (contents.into(), SystemTime::now()));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn remove(&self, path: &Path) {
        self.files.write().remove(path);
    }

    /// Number of existence probes served so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Runtime for MemoryRuntime {
    fn is_file(&self, path: &Path) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.files.read().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.files
            .read()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }

    fn read(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| RuntimeError::FileNotFound(path.to_path_buf()))
    }

    fn modified(&self, path: &Path) -> RuntimeResult<SystemTime> {
        self.files
            .read()
            .get(path)
            .map(|(_, modified)| *modified)
            .ok_or_else(|| RuntimeError::FileNotFound(path.to_path_buf()))
    }
}

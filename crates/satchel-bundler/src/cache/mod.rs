//! Persistent per-asset cache.
//!
//! One file per source path under `cache_dir`, named by the BLAKE3 digest of
//! the options' [`cache_key`](crate::BundlerOptions::cache_key) and the path.
//! Each file holds a bincode [`CacheEntry`]: the [`ProcessedAsset`] plus the
//! source modification time observed when it was written.
//!
//! # Invalidation
//!
//! A read misses when:
//! - the path was [`invalidate`](FsCache::invalidate)d since its last write
//! - no cache file exists
//! - the source file was modified after the recorded time
//!
//! Changing an output-affecting option or upgrading satchel changes the key
//! namespace, so old entries are simply never found again.
//!
//! Every failure is non-fatal: [`FsCache::read`] and [`FsCache::write`] log
//! and degrade to a miss.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::asset::ProcessedAsset;
use crate::options::BundlerOptions;
use crate::runtime::Runtime;

/// Current cache format version. Increment when [`CacheEntry`] changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Error types for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No usable entry for the path.
    #[error("cache miss")]
    CacheMiss,

    /// The path was invalidated in this session.
    #[error("entry invalidated")]
    Invalidated,

    /// The source changed after the entry was written.
    #[error("entry is stale")]
    Stale,

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Cache version mismatch.
    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// IO error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CacheError {
    /// Whether this is an ordinary miss rather than a failure worth logging.
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            CacheError::CacheMiss | CacheError::Invalidated | CacheError::Stale
        )
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Serialized content of one cache file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub format_version: u32,
    /// Source modification time in nanoseconds since the Unix epoch.
    pub source_mtime: u64,
    pub data: ProcessedAsset,
}

/// Filesystem-backed asset cache scoped to one session.
#[derive(Debug)]
pub struct FsCache {
    dir: PathBuf,
    namespace: String,
    runtime: Arc<dyn Runtime>,
    invalidated: Mutex<FxHashSet<PathBuf>>,
}

impl FsCache {
    pub fn new(options: &BundlerOptions, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            dir: options.cache_dir.clone(),
            namespace: options.cache_key(),
            runtime,
            invalidated: Mutex::new(FxHashSet::default()),
        }
    }

    /// Location of the cache file for `path`.
    pub fn entry_path(&self, path: &Path) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.to_string_lossy().as_bytes());
        self.dir.join(format!("{}.bin", hasher.finalize().to_hex()))
    }

    /// Cached result for `path`, or `None` on any miss or failure.
    pub fn read(&self, path: &Path) -> Option<ProcessedAsset> {
        match self.try_read(path) {
            Ok(data) => {
                tracing::debug!("Cache hit: {}", path.display());
                Some(data)
            }
            Err(err) if err.is_miss() => None,
            Err(err) => {
                tracing::warn!("Ignoring cache entry for {}: {}", path.display(), err);
                None
            }
        }
    }

    pub fn try_read(&self, path: &Path) -> CacheResult<ProcessedAsset> {
        if self.invalidated.lock().contains(path) {
            return Err(CacheError::Invalidated);
        }

        let bytes = match std::fs::read(self.entry_path(path)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::CacheMiss);
            }
            Err(err) => return Err(err.into()),
        };

        let entry: CacheEntry = bincode::deserialize(&bytes)
            .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
        if entry.format_version != CACHE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: entry.format_version,
            });
        }

        let current = self
            .runtime
            .modified(path)
            .map(nanos)
            .map_err(|_| CacheError::CacheMiss)?;
        if current > entry.source_mtime {
            return Err(CacheError::Stale);
        }

        Ok(entry.data)
    }

    /// Persist `data` for `path` and clear its invalidation. Failures are logged.
    pub fn write(&self, path: &Path, data: &ProcessedAsset) {
        if let Err(err) = self.try_write(path, data) {
            tracing::warn!("Failed to cache {}: {}", path.display(), err);
        }
    }

    pub fn try_write(&self, path: &Path, data: &ProcessedAsset) -> CacheResult<()> {
        let source_mtime = self
            .runtime
            .modified(path)
            .map(nanos)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let entry = CacheEntry {
            format_version: CACHE_FORMAT_VERSION,
            source_mtime,
            data: data.clone(),
        };
        let bytes = bincode::serialize(&entry)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        std::fs::create_dir_all(&self.dir)?;
        let target = self.entry_path(path);
        let staging = target.with_extension("tmp");
        std::fs::write(&staging, bytes)?;
        std::fs::rename(&staging, &target)?;

        self.invalidated.lock().remove(path);
        Ok(())
    }

    /// Make the next read of `path` miss until it is written again.
    pub fn invalidate(&self, path: &Path) {
        self.invalidated.lock().insert(path.to_path_buf());
    }

    /// Remove the cache file for `path`.
    pub fn delete(&self, path: &Path) {
        let _ = std::fs::remove_file(self.entry_path(path));
        self.invalidate(path);
    }
}

fn nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

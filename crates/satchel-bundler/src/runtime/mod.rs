//! Filesystem runtime abstraction.
//!
//! The resolver, the cache and every asset read files through the [`Runtime`]
//! trait, so tests can substitute an in-memory filesystem and count probes.
//! Calls are synchronous: resolution misses run on the blocking pool and
//! asset lifecycles run on worker threads.

mod memory;
mod native;

pub use memory::MemoryRuntime;
pub use native::NativeRuntime;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is not valid UTF-8: {}", .0.display())]
    InvalidUtf8(PathBuf),
}

impl RuntimeError {
    pub(crate) fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::FileNotFound(path.to_path_buf())
        } else {
            RuntimeError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Filesystem primitives used during resolution and asset loading.
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Whether `path` exists and is a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Whether `path` exists and is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Read the raw bytes of a file.
    fn read(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Last modification time of a file.
    fn modified(&self, path: &Path) -> RuntimeResult<SystemTime>;

    /// Read a file as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> RuntimeResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| RuntimeError::InvalidUtf8(path.to_path_buf()))
    }
}

use std::path::Path;
use std::time::SystemTime;

use super::{Runtime, RuntimeError, RuntimeResult};

/// [`Runtime`] backed by the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl Runtime for NativeRuntime {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| RuntimeError::from_io(path, e))
    }

    fn modified(&self, path: &Path) -> RuntimeResult<SystemTime> {
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| RuntimeError::from_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_files_and_reports_missing_ones() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();

        let runtime = NativeRuntime::new();
        assert!(runtime.is_file(&file));
        assert!(runtime.is_dir(dir.path()));
        assert_eq!(runtime.read_to_string(&file).unwrap(), "hello");
        assert!(runtime.modified(&file).is_ok());

        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            runtime.read(&missing),
            Err(RuntimeError::FileNotFound(_))
        ));
    }
}

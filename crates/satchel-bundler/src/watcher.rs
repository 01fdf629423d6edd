//! File system watching for rebuild-on-change.
//!
//! Watches the project root recursively and forwards changes to files that
//! are not ignored. The session decides which of them belong to the graph.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Directory names never watched, wherever they appear.
pub const DEFAULT_IGNORE: &[&str] = &["node_modules"];

/// File change event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Paths and patterns excluded from watching.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    /// Directory names (`node_modules`) or extension globs (`*.log`).
    pub patterns: Vec<String>,
    /// Absolute directories, such as the output and cache directories.
    pub dirs: Vec<PathBuf>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self {
            patterns: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            dirs: Vec::new(),
        }
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.push(dir.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Whether a change to `path` under `root` is ignored.
    pub fn is_ignored(&self, path: &Path, root: &Path) -> bool {
        let Ok(rel_path) = path.strip_prefix(root) else {
            return true;
        };
        if self.dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        let path_str = rel_path.to_string_lossy();
        for pattern in &self.patterns {
            if let Some(ext) = pattern.strip_prefix('*') {
                if path_str.ends_with(ext) {
                    return true;
                }
            } else if rel_path
                .components()
                .any(|c| c.as_os_str() == pattern.as_str())
            {
                return true;
            }
        }

        // hidden files and directories
        rel_path.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }
}

/// Recursive watcher over a project root.
///
/// Dropping it stops watching and closes the change channel.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`. Repeated events for the same path within
    /// `debounce` are collapsed.
    pub fn new(
        root: PathBuf,
        ignore: IgnoreRules,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("watch root {} is not a directory", root.display()),
            )));
        }

        let (tx, rx) = mpsc::channel(100);
        let mut last_event: Option<(PathBuf, Instant)> = None;
        let watch_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("File watcher error: {}", e);
                    return;
                }
            };

            for path in &event.paths {
                if ignore.is_ignored(path, &watch_root) {
                    continue;
                }

                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event {
                    if last_path == path && now.duration_since(*last_time) < debounce {
                        continue;
                    }
                }
                last_event = Some((path.clone(), now));

                let change = match event.kind {
                    notify::EventKind::Create(_) => FileChange::Created(path.clone()),
                    notify::EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    notify::EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };

                // receiver gone means the session stopped watching
                if tx.blocking_send(change).is_err() {
                    return;
                }
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!("Watching {}", root.display());

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Wait for the next change, then gather further changes until the channel
/// stays quiet for `quiet`. `None` once the watcher is gone.
pub async fn next_batch(
    rx: &mut mpsc::Receiver<FileChange>,
    quiet: Duration,
) -> Option<Vec<PathBuf>> {
    let first = rx.recv().await?;
    let mut paths = IndexSet::new();
    paths.insert(first.path().to_path_buf());

    while let Ok(Some(change)) = tokio::time::timeout(quiet, rx.recv()).await {
        paths.insert(change.path().to_path_buf());
    }
    Some(paths.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_modules_is_ignored_at_any_depth() {
        let root = Path::new("/project");
        let rules = IgnoreRules::new();

        assert!(rules.is_ignored(Path::new("/project/node_modules/pkg/index.js"), root));
        assert!(rules.is_ignored(Path::new("/project/packages/a/node_modules/x.js"), root));
        assert!(!rules.is_ignored(Path::new("/project/src/index.js"), root));
        assert!(!rules.is_ignored(Path::new("/project/src/node_modules_helper.js"), root));
    }

    #[test]
    fn extension_patterns_match_suffixes() {
        let root = Path::new("/project");
        let rules = IgnoreRules::new().pattern("*.log");

        assert!(rules.is_ignored(Path::new("/project/debug.log"), root));
        assert!(!rules.is_ignored(Path::new("/project/src/index.js"), root));
    }

    #[test]
    fn output_and_cache_dirs_are_ignored() {
        let root = Path::new("/project");
        let rules = IgnoreRules::new().dir("/project/dist").dir("/project/cache");

        assert!(rules.is_ignored(Path::new("/project/dist/index.js"), root));
        assert!(rules.is_ignored(Path::new("/project/cache/ab.bin"), root));
        assert!(!rules.is_ignored(Path::new("/project/distance.js"), root));
    }

    #[test]
    fn hidden_and_outside_paths_are_ignored() {
        let root = Path::new("/project");
        let rules = IgnoreRules::default();

        assert!(rules.is_ignored(Path::new("/project/.git/config"), root));
        assert!(rules.is_ignored(Path::new("/project/src/.hidden/file.js"), root));
        assert!(rules.is_ignored(Path::new("/other/file.js"), root));
    }

    #[tokio::test]
    async fn batches_collect_until_quiet() {
        let (tx, mut rx) = mpsc::channel(10);
        tx.send(FileChange::Modified("/p/a.js".into())).await.unwrap();
        tx.send(FileChange::Modified("/p/b.js".into())).await.unwrap();
        tx.send(FileChange::Modified("/p/a.js".into())).await.unwrap();

        let batch = next_batch(&mut rx, Duration::from_millis(20)).await.unwrap();
        assert_eq!(batch, [PathBuf::from("/p/a.js"), PathBuf::from("/p/b.js")]);

        drop(tx);
        assert!(next_batch(&mut rx, Duration::from_millis(20)).await.is_none());
    }
}

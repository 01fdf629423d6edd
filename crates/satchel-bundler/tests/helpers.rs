//! Shared fixtures for satchel-bundler integration tests.
//!
//! Projects are written into a fresh temp directory; output and cache
//! directories live inside it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use satchel_bundler::{BuildReport, Bundler, BundlerOptions};
use tempfile::TempDir;

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Project pre-populated with `(relative path, contents)` pairs.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let project = Self::new();
        for (path, contents) in files {
            project.write(path, contents);
        }
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write fixture file");
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).expect("remove fixture file");
    }

    pub fn out_dir(&self) -> PathBuf {
        self.path("dist")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path(".cache")
    }

    /// Options rooted at the project with two workers.
    pub fn options(&self, entries: &[&str]) -> BundlerOptions {
        BundlerOptions::new(entries.iter().map(|entry| self.path(entry)))
            .root_dir(self.root())
            .out_dir(self.out_dir())
            .cache_dir(self.cache_dir())
            .workers(2)
    }

    pub fn bundler(&self, entries: &[&str]) -> Bundler {
        Bundler::new(self.options(entries)).expect("create bundler")
    }

    /// Contents of an output file.
    pub fn output(&self, name: &str) -> String {
        fs::read_to_string(self.out_dir().join(name))
            .unwrap_or_else(|e| panic!("missing output {name}: {e}"))
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.out_dir().join(name).exists()
    }
}

/// Names of the bundles written in a pass, sorted.
pub fn packaged_names(report: &BuildReport) -> Vec<String> {
    let mut names: Vec<String> = report.packaged().map(|b| b.name.clone()).collect();
    names.sort();
    names
}

/// Names of every bundle in a pass, sorted.
pub fn bundle_names(report: &BuildReport) -> Vec<String> {
    let mut names: Vec<String> = report.bundles.iter().map(|b| b.name.clone()).collect();
    names.sort();
    names
}

//! Filesystem validation of loaded configs.

use satchel_config::{ConfigError, ConfigValidator, FsValidator, SatchelConfig, validate_fs};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn missing_entry_is_reported_with_its_path() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = SatchelConfig::default();
    config.bundle.entries = vec![PathBuf::from("src/missing.js")];

    match FsValidator::new(dir.path()).validate(&config).unwrap_err() {
        ConfigError::EntryNotFound { path } => assert!(path.ends_with("src/missing.js")),
        other => panic!("expected EntryNotFound, got {other:?}"),
    }
}

#[test]
fn entries_resolve_against_root_dir() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("web/src")).expect("mkdir");
    fs::write(dir.path().join("web/src/index.js"), "").expect("write entry");

    let mut config = SatchelConfig::default();
    config.bundle.entries = vec![PathBuf::from("src/index.js")];
    assert!(validate_fs(&config, dir.path()).is_err());

    config.bundle.root_dir = Some(PathBuf::from("web"));
    assert!(validate_fs(&config, dir.path()).is_ok());
}

#[test]
fn missing_root_dir_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = SatchelConfig::default();
    config.bundle.entries = vec![PathBuf::from("index.js")];
    config.bundle.root_dir = Some(PathBuf::from("nope"));

    assert!(matches!(
        validate_fs(&config, dir.path()).unwrap_err(),
        ConfigError::RootNotFound { .. }
    ));
}

#[test]
fn schema_errors_come_before_filesystem_checks() {
    let dir = TempDir::new().expect("tempdir");
    let config = SatchelConfig::default();
    assert!(matches!(
        validate_fs(&config, dir.path()).unwrap_err(),
        ConfigError::NoEntries
    ));
}

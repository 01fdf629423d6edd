//! Profile selection through discovered config files.

use satchel_config::{ConfigDiscovery, ConfigError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_config(dir: &Path, contents: &str) {
    fs::write(dir.join("satchel.toml"), contents).expect("write config");
}

#[test]
fn profile_overrides_bundle_options() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        r#"
[bundle]
entries = ["src/index.html"]
minify = false
cache = true

[profiles.production.bundle]
minify = true
production = true
cache = false
"#,
    );

    let config = ConfigDiscovery::new(dir.path())
        .load_with_profile("production")
        .expect("load with profile");

    assert!(config.bundle.minify);
    assert!(config.bundle.production);
    assert!(!config.bundle.cache);
    assert_eq!(config.bundle.entries, vec![PathBuf::from("src/index.html")]);
}

#[test]
fn profile_creates_dev_section_when_missing() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        r#"
[bundle]
entries = ["index.js"]

[profiles.lan.dev]
host = "0.0.0.0"
port = 8080
"#,
    );

    let discovery = ConfigDiscovery::new(dir.path());
    assert!(discovery.load().expect("load").dev.is_none());

    let config = discovery.load_with_profile("lan").expect("load with profile");
    let dev = config.dev.expect("dev section");
    assert_eq!(dev.host, "0.0.0.0");
    assert_eq!(dev.port, 8080);
    assert_eq!(dev.hmr_path, "/__satchel_hmr__");
}

#[test]
fn profile_overrides_settings() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        r#"
[bundle]
entries = ["index.js"]

[settings]
log_level = "info"

[profiles.ci.settings]
log_level = "warn"
no_color = true
"#,
    );

    let config = ConfigDiscovery::new(dir.path())
        .load_with_profile("ci")
        .expect("load with profile");
    assert_eq!(config.settings.log_level.as_deref(), Some("warn"));
    assert!(config.settings.no_color);
}

#[test]
fn package_json_profiles_work_like_toml() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join("package.json"),
        r#"{
            "name": "app",
            "satchel": {
                "bundle": { "entries": ["index.js"], "out_dir": "build" },
                "profiles": { "cdn": { "bundle": { "public_url": "https://cdn.example.com/app" } } }
            }
        }"#,
    )
    .expect("write package.json");

    let config = ConfigDiscovery::new(dir.path())
        .load_with_profile("cdn")
        .expect("load with profile");
    assert_eq!(config.bundle.public_url, "https://cdn.example.com/app");
    assert_eq!(config.bundle.out_dir, PathBuf::from("build"));

    let options = config.to_bundler_options(dir.path());
    assert_eq!(options.public_url, "https://cdn.example.com/app/");
}

#[test]
fn missing_profile_is_reported_by_name() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "[bundle]\nentries = [\"index.js\"]\n");

    let err = ConfigDiscovery::new(dir.path())
        .load_with_profile("nightly")
        .unwrap_err();
    assert!(matches!(err, ConfigError::ProfileNotFound(ref name) if name == "nightly"));
    assert_eq!(err.to_string(), "profile 'nightly' is not defined");
}

//! package.json descriptors attached to resolutions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::runtime::Runtime;

/// Maximum allowed size for package.json files (10MB)
const MAX_PACKAGE_JSON_SIZE: usize = 10 * 1024 * 1024;

/// The subset of package.json fields the bundler cares about.
///
/// When a package declares a `module` entry it replaces `main`, so everything
/// downstream sees the ES module variant of the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    pub main: Option<String>,
    pub browser: Option<String>,
    pub source: Option<String>,
    /// Directory containing the package.json.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawPackageJson {
    name: Option<String>,
    version: Option<String>,
    main: Option<String>,
    module: Option<String>,
    // `browser` may also be an object of replacements, which is not supported
    browser: Option<serde_json::Value>,
    source: Option<String>,
}

impl PackageDescriptor {
    /// Parse package.json text found in `dir`.
    pub fn parse(dir: &Path, contents: &str) -> Result<Self, serde_json::Error> {
        let raw: RawPackageJson = serde_json::from_str(contents)?;

        Ok(Self {
            name: raw.name,
            version: raw.version,
            main: raw.module.or(raw.main),
            browser: raw.browser.and_then(|b| b.as_str().map(str::to_string)),
            source: raw.source,
            dir: dir.to_path_buf(),
        })
    }

    /// Read `dir/package.json`. Missing, oversized or malformed files yield `None`.
    pub fn read(runtime: &dyn Runtime, dir: &Path) -> Option<Self> {
        let path = dir.join("package.json");
        if !runtime.is_file(&path) {
            return None;
        }

        let contents = match runtime.read_to_string(&path) {
            Ok(contents) if contents.len() <= MAX_PACKAGE_JSON_SIZE => contents,
            Ok(_) => {
                tracing::warn!("Ignoring oversized {}", path.display());
                return None;
            }
            Err(err) => {
                tracing::debug!("Cannot read {}: {}", path.display(), err);
                return None;
            }
        };

        match Self::parse(dir, &contents) {
            Ok(descriptor) => Some(descriptor),
            Err(err) => {
                tracing::warn!("Ignoring malformed {}: {}", path.display(), err);
                None
            }
        }
    }

    /// The entry file declared by this package, in priority order.
    pub fn entry(&self) -> Option<&str> {
        self.main.as_deref().or(self.browser.as_deref())
    }
}

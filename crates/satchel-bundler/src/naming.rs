//! Output file names for bundles.
//!
//! URL-referenced bundles get names that depend only on the target path, so a
//! worker can rewrite `url(...)`/`src=` references without seeing the bundle
//! tree. Every other bundle is named after its entry file and made unique
//! within the tree on demand.

use std::path::Path;

use crate::asset::AssetType;

/// Hex digits of the path hash embedded in names.
const HASH_LEN: usize = 8;

/// Short hash of `path` relative to `root`.
pub fn path_hash(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let key = relative.to_string_lossy().replace('\\', "/");
    let mut hex = blake3::hash(key.as_bytes()).to_hex().to_string();
    hex.truncate(HASH_LEN);
    hex
}

/// File stem of `path`, or `index` when it has none.
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index".to_string())
}

/// `<stem>.<type>` for entry and dynamic-import bundles.
pub fn entry_bundle_name(path: &Path, bundle_type: &AssetType) -> String {
    with_extension(&stem(path), bundle_type)
}

/// `<stem>.<hash8>.<type>` for URL-referenced bundles; documents keep `<stem>.html`.
pub fn url_bundle_name(path: &Path, root: &Path, bundle_type: &AssetType) -> String {
    if *bundle_type == AssetType::Html {
        return entry_bundle_name(path, bundle_type);
    }
    let base = format!("{}.{}", stem(path), path_hash(path, root));
    with_extension(&base, bundle_type)
}

/// Name of the `sibling_type` sibling of a bundle called `parent_name`.
pub fn sibling_bundle_name(parent_name: &str, sibling_type: &AssetType) -> String {
    let base = Path::new(parent_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| parent_name.to_string());
    with_extension(&base, sibling_type)
}

/// Insert the path hash before the extension: `lazy.js` becomes `lazy.1a2b3c4d.js`.
pub fn disambiguate(name: &str, path: &Path, root: &Path) -> String {
    let hash = path_hash(path, root);
    match name.rsplit_once('.') {
        Some((base, ext)) => format!("{base}.{hash}.{ext}"),
        None => format!("{name}.{hash}"),
    }
}

fn with_extension(base: &str, bundle_type: &AssetType) -> String {
    match bundle_type.as_str() {
        "" => base.to_string(),
        ext => format!("{base}.{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_names_embed_a_stable_path_hash() {
        let root = Path::new("/app");
        let name = url_bundle_name(Path::new("/app/img/logo.png"), root, &"png".into());
        assert!(name.starts_with("logo."));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "logo.".len() + HASH_LEN + ".png".len());

        let again = url_bundle_name(Path::new("/app/img/logo.png"), root, &"png".into());
        assert_eq!(name, again);

        let other = url_bundle_name(Path::new("/app/other/logo.png"), root, &"png".into());
        assert_ne!(name, other);
    }

    #[test]
    fn documents_keep_their_name() {
        let name = url_bundle_name(Path::new("/app/about.html"), Path::new("/app"), &AssetType::Html);
        assert_eq!(name, "about.html");
    }

    #[test]
    fn siblings_swap_the_extension() {
        assert_eq!(sibling_bundle_name("main.js", &AssetType::Css), "main.css");
        assert_eq!(
            sibling_bundle_name("logo.1a2b3c4d.png", &AssetType::Js),
            "logo.1a2b3c4d.js"
        );
    }

    #[test]
    fn disambiguation_inserts_the_hash() {
        let name = disambiguate("lazy.js", Path::new("/app/b/lazy.js"), Path::new("/app"));
        assert!(name.starts_with("lazy."));
        assert!(name.ends_with(".js"));
        assert_ne!(name, "lazy.js");
    }
}

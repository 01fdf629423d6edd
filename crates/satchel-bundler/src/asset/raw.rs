use std::path::{Path, PathBuf};

use super::{Asset, AssetContext, AssetError, AssetType, Dependency, Generated, ParseState};

/// A file copied verbatim into its own bundle.
///
/// Scripts that import it receive its public URL. The generated entry under
/// the file's own type holds a digest of the bytes rather than the bytes
/// themselves; the raw packager copies the file from disk.
pub struct RawAsset {
    path: PathBuf,
    digest: String,
}

impl RawAsset {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            digest: String::new(),
        }
    }
}

impl Asset for RawAsset {
    fn asset_type(&self) -> AssetType {
        AssetType::from_path(&self.path)
    }

    fn source(&self) -> &str {
        &self.digest
    }

    fn set_source(&mut self, source: String) {
        self.digest = blake3::hash(source.as_bytes()).to_hex().to_string();
    }

    fn load(&mut self, cx: &AssetContext<'_>) -> Result<(), AssetError> {
        let bytes = cx
            .runtime
            .read(&self.path)
            .map_err(|e| AssetError::new(&self.path, e.to_string()))?;
        self.digest = blake3::hash(&bytes).to_hex().to_string();
        Ok(())
    }

    fn needs_parse(&self) -> bool {
        false
    }

    fn parse_state(&self) -> ParseState {
        ParseState::Unparsed
    }

    fn parse(&mut self, _cx: &AssetContext<'_>) -> Result<(), AssetError> {
        Ok(())
    }

    fn collect_dependencies(
        &mut self,
        _cx: &AssetContext<'_>,
    ) -> Result<Vec<Dependency>, AssetError> {
        Ok(Vec::new())
    }

    fn generate(&mut self, cx: &AssetContext<'_>) -> Result<Generated, AssetError> {
        let url = cx.public_url_for(&self.path);
        let export = serde_json::to_string(&url)
            .map_err(|e| AssetError::new(&self.path, e.to_string()))?;

        let mut generated = Generated::new();
        generated.insert(self.asset_type(), self.digest.clone());
        generated.insert(AssetType::Js, format!("module.exports = {export};"));
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use crate::asset::{AssetType, test_support};
    use crate::runtime::MemoryRuntime;

    #[test]
    fn raw_asset_exports_its_public_url() {
        let runtime = MemoryRuntime::new().with_file("/app/img/logo.png", vec![0u8, 1, 2]);
        let options = test_support::options().public_url("/static");
        let out = test_support::run(&runtime, &options, "/app/img/logo.png").unwrap();

        assert_eq!(out.asset_type, AssetType::Other("png".into()));
        let js = out.output(&AssetType::Js).unwrap();
        assert!(js.starts_with("module.exports = \"/static/logo."));
        assert!(js.ends_with(".png\";"));
    }

    #[test]
    fn content_changes_change_the_hash() {
        let runtime = MemoryRuntime::new().with_file("/app/a.bin", vec![1u8]);
        let options = test_support::options();
        let first = test_support::run(&runtime, &options, "/app/a.bin").unwrap();

        runtime.insert("/app/a.bin", vec![2u8]);
        let second = test_support::run(&runtime, &options, "/app/a.bin").unwrap();

        assert_ne!(first.hash, second.hash);
        assert_eq!(first.output(&AssetType::Js), second.output(&AssetType::Js));
    }
}

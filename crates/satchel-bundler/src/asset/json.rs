use std::path::{Path, PathBuf};

use super::{Asset, AssetContext, AssetError, AssetType, Dependency, Generated, ParseState};

/// JSON data exposed to scripts as `module.exports`.
///
/// JSON has no dependencies, so the structure step is skipped; the source is
/// only validated during generation.
pub struct JsonAsset {
    path: PathBuf,
    source: String,
}

impl JsonAsset {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            source: String::new(),
        }
    }
}

impl Asset for JsonAsset {
    fn asset_type(&self) -> AssetType {
        AssetType::Js
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn set_source(&mut self, source: String) {
        self.source = source;
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
        let value: serde_json::Value = serde_json::from_str(&self.source).map_err(|e| {
            let offset = crate::diagnostics::line_col_to_offset(
                &self.source,
                e.line() as u32,
                e.column() as u32,
            )
            .unwrap_or(0);
            AssetError::new(&self.path, format!("Invalid JSON: {e}")).at_offset(&self.source, offset)
        })?;

        let body = if cx.options.minify {
            value.to_string()
        } else {
            self.source.trim().to_string()
        };

        let mut generated = Generated::new();
        generated.insert(AssetType::Js, format!("module.exports = {body};"));
        Ok(generated)
    }
}

use std::sync::Arc;

use super::{Asset, AssetContext, AssetError, AssetType, Dependency, Generated, ParseState};

/// Source-to-source rewrite applied by a dialect before the inner type runs.
pub trait SourceTransform: Send + Sync {
    fn transform(&self, source: String, cx: &AssetContext<'_>) -> Result<String, AssetError>;
}

impl<F> SourceTransform for F
where
    F: Fn(String, &AssetContext<'_>) -> Result<String, AssetError> + Send + Sync,
{
    fn transform(&self, source: String, cx: &AssetContext<'_>) -> Result<String, AssetError> {
        self(source, cx)
    }
}

/// A source dialect compiled to another asset type.
///
/// Compilation happens on first parse; every later step, including dependency
/// collection and generation, runs on the inner asset against the compiled source.
pub struct DialectAsset {
    transform: Arc<dyn SourceTransform>,
    inner: Box<dyn Asset>,
    compiled: bool,
}

impl DialectAsset {
    pub fn new(transform: Arc<dyn SourceTransform>, inner: Box<dyn Asset>) -> Self {
        Self {
            transform,
            inner,
            compiled: false,
        }
    }
}

impl Asset for DialectAsset {
    fn asset_type(&self) -> AssetType {
        self.inner.asset_type()
    }

    fn source(&self) -> &str {
        self.inner.source()
    }

    fn set_source(&mut self, source: String) {
        self.compiled = false;
        self.inner.set_source(source);
    }

    fn parse_state(&self) -> ParseState {
        if !self.compiled {
            ParseState::Unparsed
        } else if self.inner.needs_parse() {
            self.inner.parse_state()
        } else {
            ParseState::Parsed
        }
    }

    fn parse(&mut self, cx: &AssetContext<'_>) -> Result<(), AssetError> {
        if !self.compiled {
            let compiled = self
                .transform
                .transform(self.inner.source().to_string(), cx)?;
            self.inner.set_source(compiled);
            self.compiled = true;
        }

        if self.inner.needs_parse() && !self.inner.parse_state().is_parsed() {
            self.inner.parse(cx)?;
        }
        Ok(())
    }

    fn collect_dependencies(
        &mut self,
        cx: &AssetContext<'_>,
    ) -> Result<Vec<Dependency>, AssetError> {
        self.inner.collect_dependencies(cx)
    }

    fn pretransform(&mut self, cx: &AssetContext<'_>) -> Result<(), AssetError> {
        self.inner.pretransform(cx)
    }

    fn transform(&mut self, cx: &AssetContext<'_>) -> Result<(), AssetError> {
        self.inner.transform(cx)
    }

    fn generate(&mut self, cx: &AssetContext<'_>) -> Result<Generated, AssetError> {
        self.inner.generate(cx)
    }
}

use async_trait::async_trait;

use super::{BundleWriter, PackageContext, Packager};
use crate::Result;
use crate::asset::AssetType;
use crate::graph::NodeIdx;

/// Concatenates stylesheets in dependency order.
#[derive(Debug, Default)]
pub struct CssPackager {
    written: usize,
}

impl CssPackager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Packager for CssPackager {
    async fn add_asset(
        &mut self,
        cx: &PackageContext<'_>,
        out: &mut BundleWriter,
        asset: NodeIdx,
    ) -> Result<()> {
        let Some(css) = cx
            .processed(asset)
            .and_then(|processed| processed.output(&AssetType::Css))
        else {
            return Ok(());
        };

        if self.written > 0 && !cx.options.minify {
            out.write_str("\n").await?;
        }
        out.write_str(css.trim_end()).await?;
        self.written += 1;
        Ok(())
    }

    async fn end(&mut self, cx: &PackageContext<'_>, out: &mut BundleWriter) -> Result<()> {
        if self.written > 0 && !cx.options.minify {
            out.write_str("\n").await?;
        }
        Ok(())
    }
}

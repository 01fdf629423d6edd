use async_trait::async_trait;

use super::{BundleWriter, PackageContext, Packager};
use crate::Result;
use crate::graph::NodeIdx;
use crate::naming;

/// Copies each asset verbatim to the URL name references were rewritten to.
#[derive(Debug, Default)]
pub struct RawPackager;

impl RawPackager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Packager for RawPackager {
    async fn add_asset(
        &mut self,
        cx: &PackageContext<'_>,
        out: &mut BundleWriter,
        asset: NodeIdx,
    ) -> Result<()> {
        let node = cx.graph.node(asset);
        let Some(processed) = node.processed.as_ref() else {
            return Ok(());
        };

        let name = naming::url_bundle_name(&node.path, &cx.options.root_dir, &processed.asset_type);
        let target = cx.options.out_dir.join(name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| out.error(e))?;
        }

        let bytes = tokio::fs::copy(&node.path, &target)
            .await
            .map_err(|e| out.error(format!("{}: {e}", node.path.display())))?;
        out.record(bytes);
        Ok(())
    }
}

//! Live updates for development clients.
//!
//! After every pass the session hands the changed script assets to the
//! [`HmrServer`], which broadcasts them as JSON messages over a Server-Sent
//! Events stream. Build errors are kept until a clean pass clears them, so a
//! page connecting in between still sees the overlay.

mod server;

pub use server::HmrServer;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::asset::{AssetType, Generated};
use crate::bundle::BundleTree;
use crate::graph::{AssetGraph, ModuleId, ModuleIds, NodeIdx};
use crate::packager::dependency_map;

/// A message on the live-update stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrMessage {
    /// Hot-swap the listed modules.
    Update { assets: Vec<HmrAsset> },
    /// Reload the whole page.
    Reload,
    /// A build pass failed.
    Error { error: HmrError },
    /// The last reported error is gone.
    ErrorResolved,
}

impl HmrMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }
}

/// Error payload shown in the client overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrError {
    pub message: String,
    /// Code frame of the failing source, when there is one.
    pub stack: Option<String>,
}

impl From<&crate::Error> for HmrError {
    fn from(err: &crate::Error) -> Self {
        Self {
            message: err.to_string(),
            stack: err.code_frame().map(str::to_string),
        }
    }
}

/// One replaced module: its id, generated output and dependency map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmrAsset {
    pub id: ModuleId,
    #[serde(skip_serializing, default = "script_type")]
    pub asset_type: AssetType,
    pub generated: Generated,
    pub deps: Map<String, Value>,
}

impl HmrAsset {
    /// Build the update entry for a graph node.
    ///
    /// `None` when the node has no module id, which means no script bundle
    /// carries it and the page can only pick the change up by reloading.
    pub fn from_node(
        graph: &AssetGraph,
        ids: &ModuleIds,
        tree: &BundleTree,
        idx: NodeIdx,
    ) -> Option<Self> {
        let node = graph.node(idx);
        let processed = node.processed.as_ref()?;
        let id = ids.get(idx)?;

        // same map the script bundle was written with; dedup is off under HMR
        let bundle = tree
            .bundles()
            .find(|b| b.bundle_type == AssetType::Js && b.assets.contains(&idx))
            .map(|b| b.id);
        let deps = dependency_map(tree, graph, ids, bundle, idx, |_| None);

        Some(Self {
            id,
            asset_type: processed.asset_type.clone(),
            generated: processed.generated.clone(),
            deps,
        })
    }
}

fn script_type() -> AssetType {
    AssetType::Js
}

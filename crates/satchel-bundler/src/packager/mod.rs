//! Bundle serialization.
//!
//! A [`Packager`] is created per bundle and driven through `start`, one
//! `add_asset` per member in dependency-first order, then `end`. The driver
//! owns the ordering and the "included" set, so implementations only decide
//! how a single asset is written.
//!
//! [`package_tree`] packages every non-empty bundle concurrently and skips
//! those whose content hash matches the previous pass.

mod css;
mod html;
mod js;
mod raw;

pub use css::CssPackager;
pub use html::HtmlPackager;
pub use js::JsPackager;
pub(crate) use js::dependency_map;
pub use raw::RawPackager;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::asset::{AssetType, ProcessedAsset};
use crate::bundle::{Bundle, BundleId, BundleTree};
use crate::graph::{AssetGraph, ModuleIds, NodeIdx};
use crate::options::BundlerOptions;
use crate::{Error, Result};

/// Everything a packager may look at while writing one bundle.
#[derive(Clone, Copy)]
pub struct PackageContext<'a> {
    pub bundle: &'a Bundle,
    pub tree: &'a BundleTree,
    pub graph: &'a AssetGraph,
    pub ids: &'a ModuleIds,
    pub options: &'a BundlerOptions,
}

impl<'a> PackageContext<'a> {
    pub fn processed(&self, asset: NodeIdx) -> Option<&'a ProcessedAsset> {
        self.graph.node(asset).processed.as_deref()
    }

    /// Public URL of another bundle.
    pub fn bundle_url(&self, bundle: BundleId) -> String {
        format!("{}{}", self.options.public_url, self.tree.bundle(bundle).name)
    }
}

/// Lazily opened, buffered output file of one bundle.
///
/// Nothing is created on disk until the first write, so packagers that copy
/// files instead of writing a bundle leave no empty artifact behind.
pub struct BundleWriter {
    path: PathBuf,
    bundle: String,
    writer: Option<BufWriter<File>>,
    size: u64,
}

impl BundleWriter {
    pub fn new(path: PathBuf, bundle: impl Into<String>) -> Self {
        Self {
            path,
            bundle: bundle.into(),
            writer: None,
            size: 0,
        }
    }

    pub async fn write_str(&mut self, text: &str) -> Result<()> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.error(e))?;
            }
            let file = File::create(&self.path).await.map_err(|e| self.error(e))?;
            self.writer = Some(BufWriter::new(file));
        }

        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write_all(text.as_bytes()).await {
                return Err(self.error(e));
            }
        }
        self.size += text.len() as u64;
        Ok(())
    }

    /// Account for bytes written to disk some other way.
    pub fn record(&mut self, bytes: u64) {
        self.size += bytes;
    }

    /// Flush and return the number of bytes produced.
    pub async fn finish(mut self) -> Result<u64> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush().await {
                return Err(self.error(e));
            }
        }
        Ok(self.size)
    }

    pub fn error(&self, err: impl fmt::Display) -> Error {
        Error::Packaging {
            bundle: self.bundle.clone(),
            message: err.to_string(),
        }
    }
}

/// Per-type bundle serializer.
#[async_trait]
pub trait Packager: Send {
    /// Write the prologue.
    async fn start(&mut self, _cx: &PackageContext<'_>, _out: &mut BundleWriter) -> Result<()> {
        Ok(())
    }

    /// Write one asset. Its in-bundle dependencies have already been added.
    async fn add_asset(
        &mut self,
        cx: &PackageContext<'_>,
        out: &mut BundleWriter,
        asset: NodeIdx,
    ) -> Result<()>;

    /// Write the epilogue.
    async fn end(&mut self, _cx: &PackageContext<'_>, _out: &mut BundleWriter) -> Result<()> {
        Ok(())
    }
}

type PackagerFactory = Arc<dyn Fn() -> Box<dyn Packager> + Send + Sync>;

/// Packager constructors by bundle type. Unknown types use [`RawPackager`].
#[derive(Clone)]
pub struct PackagerRegistry {
    factories: FxHashMap<String, PackagerFactory>,
}

impl fmt::Debug for PackagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("PackagerRegistry")
            .field("types", &types)
            .finish()
    }
}

impl Default for PackagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PackagerRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: FxHashMap::default(),
        };
        registry.register(AssetType::Js, || Box::new(JsPackager::new()));
        registry.register(AssetType::Css, || Box::new(CssPackager::new()));
        registry.register(AssetType::Html, || Box::new(HtmlPackager::new()));
        registry
    }

    /// Register (or replace) the packager for a bundle type.
    pub fn register<F>(&mut self, bundle_type: AssetType, factory: F)
    where
        F: Fn() -> Box<dyn Packager> + Send + Sync + 'static,
    {
        self.factories
            .insert(bundle_type.as_str().to_string(), Arc::new(factory));
    }

    pub fn create(&self, bundle_type: &AssetType) -> Box<dyn Packager> {
        match self.factories.get(bundle_type.as_str()) {
            Some(factory) => factory(),
            None => Box::new(RawPackager::new()),
        }
    }
}

/// Outcome for one bundle of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleReport {
    pub name: String,
    pub bundle_type: AssetType,
    pub hash: String,
    /// Bytes written when the bundle was last packaged.
    pub size: u64,
    /// Whether the bundle was written in this pass.
    pub packaged: bool,
}

/// Result of [`package_tree`]. Failures are isolated per bundle.
#[derive(Debug, Default)]
pub struct PackageOutcome {
    pub reports: Vec<BundleReport>,
    pub errors: Vec<Error>,
}

/// Shared inputs of a packaging pass.
#[derive(Clone, Copy)]
pub struct PackageInputs<'a> {
    pub tree: &'a BundleTree,
    pub graph: &'a AssetGraph,
    pub ids: &'a ModuleIds,
    pub options: &'a BundlerOptions,
    pub registry: &'a PackagerRegistry,
}

/// Package every non-empty bundle of `tree`.
///
/// A bundle whose hash equals its entry in `previous` is not written again;
/// its children are still visited since they may have changed on their own.
pub async fn package_tree(
    inputs: PackageInputs<'_>,
    previous: &FxHashMap<String, BundleReport>,
) -> PackageOutcome {
    let mut outcome = PackageOutcome::default();
    let mut pending = Vec::new();

    for id in tree_order(inputs.tree) {
        let bundle = inputs.tree.bundle(id);
        if bundle.is_empty() {
            continue;
        }

        let hash = inputs.tree.bundle_hash(id, inputs.graph);
        match previous.get(&bundle.name) {
            Some(report) if report.hash == hash => {
                tracing::debug!("Bundle {} unchanged, skipping", bundle.name);
                outcome.reports.push(BundleReport {
                    packaged: false,
                    ..report.clone()
                });
            }
            _ => pending.push((id, hash)),
        }
    }

    let results = join_all(pending.into_iter().map(|(id, hash)| async move {
        let bundle = inputs.tree.bundle(id);
        let cx = PackageContext {
            bundle,
            tree: inputs.tree,
            graph: inputs.graph,
            ids: inputs.ids,
            options: inputs.options,
        };
        let mut packager = inputs.registry.create(&bundle.bundle_type);
        package_bundle(&cx, packager.as_mut())
            .await
            .map(|size| BundleReport {
                name: bundle.name.clone(),
                bundle_type: bundle.bundle_type.clone(),
                hash,
                size,
                packaged: true,
            })
    }))
    .await;

    for result in results {
        match result {
            Ok(report) => {
                tracing::debug!("Packaged {} ({} bytes)", report.name, report.size);
                outcome.reports.push(report);
            }
            Err(err) => outcome.errors.push(err),
        }
    }
    outcome
}

/// Drive one packager over a bundle.
pub async fn package_bundle(cx: &PackageContext<'_>, packager: &mut dyn Packager) -> Result<u64> {
    let mut out = BundleWriter::new(cx.options.out_dir.join(&cx.bundle.name), &cx.bundle.name);

    packager.start(cx, &mut out).await?;
    for asset in dependency_order(cx.bundle, cx.graph) {
        packager.add_asset(cx, &mut out, asset).await?;
    }
    packager.end(cx, &mut out).await?;

    out.finish().await
}

/// Members of `bundle` with every static in-bundle dependency before its dependents.
pub fn dependency_order(bundle: &Bundle, graph: &AssetGraph) -> Vec<NodeIdx> {
    fn visit(
        idx: NodeIdx,
        bundle: &Bundle,
        graph: &AssetGraph,
        included: &mut FxHashSet<NodeIdx>,
        order: &mut Vec<NodeIdx>,
    ) {
        if !bundle.assets.contains(&idx) || !included.insert(idx) {
            return;
        }
        for (dependency, dep) in graph.node(idx).asset_deps() {
            if !dependency.dynamic {
                visit(dep, bundle, graph, included, order);
            }
        }
        order.push(idx);
    }

    let mut included = FxHashSet::default();
    let mut order = Vec::with_capacity(bundle.assets.len());
    for &idx in &bundle.assets {
        visit(idx, bundle, graph, &mut included, &mut order);
    }
    order
}

/// Bundles in depth-first order from the roots.
fn tree_order(tree: &BundleTree) -> Vec<BundleId> {
    let mut order = Vec::with_capacity(tree.len());
    let mut stack: Vec<BundleId> = tree.roots().iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        order.push(id);
        stack.extend(tree.bundle(id).children.iter().rev().copied());
    }
    order
}

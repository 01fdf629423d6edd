//! The bundling session.
//!
//! A [`Bundler`] keeps everything a rebuild needs between passes: the
//! resolver memo table, the cache, the worker threads, the asset graph, module
//! ids and the hash of every bundle written so far.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::Instrument;

use crate::asset::{AssetRegistry, AssetType, SourceTransform};
use crate::bundle::{BundleTree, build_bundle_tree};
use crate::cache::FsCache;
use crate::graph::{AssetGraph, BuildStats, GraphBuilder, ModuleIds, NodeIdx};
use crate::hmr::{HmrAsset, HmrServer};
use crate::options::BundlerOptions;
use crate::packager::{PackageInputs, Packager, PackagerRegistry, package_tree};
use crate::resolver::Resolver;
use crate::runtime::{NativeRuntime, Runtime};
use crate::watcher::{FileWatcher, IgnoreRules, next_batch};
use crate::worker::WorkerPool;
use crate::{Error, Result};

pub use crate::packager::BundleReport;

/// Quiet period that ends a batch of file changes.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(50);

/// Summary of one build pass.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Every non-empty bundle, in tree order.
    pub bundles: Vec<BundleReport>,
    /// Assets run through a worker.
    pub processed: usize,
    /// Assets restored from the cache.
    pub cache_hits: usize,
    pub duration: Duration,
}

impl BuildReport {
    /// Bundles written in this pass.
    pub fn packaged(&self) -> impl Iterator<Item = &BundleReport> + '_ {
        self.bundles.iter().filter(|bundle| bundle.packaged)
    }

    pub fn bundle(&self, name: &str) -> Option<&BundleReport> {
        self.bundles.iter().find(|bundle| bundle.name == name)
    }

    pub fn total_size(&self) -> u64 {
        self.bundles.iter().map(|bundle| bundle.size).sum()
    }
}

/// Builder for [`Bundler`] with custom runtimes, asset types or packagers.
pub struct BundlerBuilder {
    options: BundlerOptions,
    runtime: Option<Arc<dyn Runtime>>,
    assets: AssetRegistry,
    packagers: PackagerRegistry,
    hmr: Option<HmrServer>,
}

impl BundlerBuilder {
    pub fn new(options: BundlerOptions) -> Self {
        Self {
            options,
            runtime: None,
            assets: AssetRegistry::new(),
            packagers: PackagerRegistry::new(),
            hmr: None,
        }
    }

    /// Filesystem used by the resolver, the cache and the workers.
    pub fn runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replace the asset type table.
    pub fn assets(mut self, assets: AssetRegistry) -> Self {
        self.assets = assets;
        self
    }

    /// Handle `extension` by transforming it and processing the result like `inner_extension`.
    pub fn dialect(
        mut self,
        extension: &str,
        inner_extension: &str,
        transform: Arc<dyn SourceTransform>,
    ) -> Self {
        self.assets.register_dialect(extension, inner_extension, transform);
        self
    }

    /// Use a custom packager for bundles of `bundle_type`.
    pub fn packager<F>(mut self, bundle_type: AssetType, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Packager> + Send + Sync + 'static,
    {
        self.packagers.register(bundle_type, factory);
        self
    }

    /// Share an existing live-update server, e.g. one already mounted in a router.
    pub fn hmr_server(mut self, server: HmrServer) -> Self {
        self.hmr = Some(server);
        self
    }

    pub fn build(self) -> Result<Bundler> {
        let options = self.options.normalized()?;
        if options.entries.is_empty() {
            return Err(Error::InvalidConfig("no entry files given".to_string()));
        }

        let options = Arc::new(options);
        let runtime = self
            .runtime
            .unwrap_or_else(|| Arc::new(NativeRuntime::new()) as Arc<dyn Runtime>);
        let cache = options
            .cache
            .then(|| FsCache::new(&options, Arc::clone(&runtime)));
        let pool = WorkerPool::new(options.workers, self.assets, Arc::clone(&runtime))?;
        let hmr = match self.hmr {
            Some(server) => Some(server),
            None => options.hmr.then(|| HmrServer::new(options.hmr_path.clone())),
        };

        tracing::debug!(
            "Bundler ready: {} entries, {} workers, cache {}",
            options.entries.len(),
            pool.size(),
            if cache.is_some() { "on" } else { "off" }
        );

        Ok(Bundler {
            resolver: Resolver::new(Arc::clone(&runtime), Arc::clone(&options)),
            options,
            runtime,
            cache,
            pool,
            packagers: self.packagers,
            graph: AssetGraph::new(),
            ids: ModuleIds::new(),
            tree: None,
            previous: FxHashMap::default(),
            unreported: IndexSet::new(),
            hmr,
        })
    }
}

/// An incremental bundling session.
///
/// Dropping it stops the worker threads.
pub struct Bundler {
    options: Arc<BundlerOptions>,
    runtime: Arc<dyn Runtime>,
    resolver: Resolver,
    cache: Option<FsCache>,
    pool: WorkerPool,
    packagers: PackagerRegistry,
    graph: AssetGraph,
    ids: ModuleIds,
    tree: Option<BundleTree>,
    /// Last successfully written report per bundle name.
    previous: FxHashMap<String, BundleReport>,
    /// Changed assets not yet sent to live-update clients.
    unreported: IndexSet<NodeIdx>,
    hmr: Option<HmrServer>,
}

impl std::fmt::Debug for Bundler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundler")
            .field("entries", &self.options.entries)
            .field("assets", &self.graph.len())
            .field("pool", &self.pool)
            .finish()
    }
}

impl Bundler {
    /// Session with the default runtime, asset types and packagers.
    pub fn new(options: BundlerOptions) -> Result<Self> {
        BundlerBuilder::new(options).build()
    }

    pub fn builder(options: BundlerOptions) -> BundlerBuilder {
        BundlerBuilder::new(options)
    }

    pub fn options(&self) -> &BundlerOptions {
        &self.options
    }

    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    pub fn module_ids(&self) -> &ModuleIds {
        &self.ids
    }

    /// Bundle tree of the last pass that reached packaging.
    pub fn bundle_tree(&self) -> Option<&BundleTree> {
        self.tree.as_ref()
    }

    pub fn hmr(&self) -> Option<&HmrServer> {
        self.hmr.as_ref()
    }

    /// Build everything that is not up to date.
    ///
    /// On the first call that is the whole graph; later calls only redo
    /// assets marked by [`rebuild`](Self::rebuild) or left failed.
    pub async fn bundle(&mut self) -> Result<BuildReport> {
        let span = tracing::info_span!("build", entries = self.options.entries.len());
        self.pass().instrument(span).await
    }

    /// Rebuild after `changed` files were modified, created or deleted.
    ///
    /// Paths the graph does not know about are ignored. A deleted file sends
    /// its dependents back through resolution so they report it as missing.
    pub async fn rebuild<I, P>(&mut self, changed: I) -> Result<BuildReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in changed {
            self.invalidate(path.as_ref());
        }
        self.bundle().await
    }

    /// Build, then rebuild on every relevant file change until the watcher
    /// stops. Pass failures are logged and do not end the loop.
    pub async fn watch(&mut self) -> Result<()> {
        self.watch_with(|_| {}).await
    }

    /// [`watch`](Self::watch), calling `on_pass` with the outcome of every pass.
    pub async fn watch_with<F>(&mut self, mut on_pass: F) -> Result<()>
    where
        F: FnMut(&Result<BuildReport>),
    {
        let ignore = IgnoreRules::new()
            .dir(self.options.out_dir.clone())
            .dir(self.options.cache_dir.clone());
        let (_watcher, mut changes) =
            FileWatcher::new(self.options.root_dir.clone(), ignore, WATCH_DEBOUNCE)?;

        let result = self.bundle().await;
        log_failure(&result);
        on_pass(&result);

        while let Some(paths) = next_batch(&mut changes, WATCH_DEBOUNCE).await {
            let relevant = self.relevant_changes(paths);
            if relevant.is_empty() {
                continue;
            }
            tracing::info!("{} file(s) changed, rebuilding", relevant.len());

            let result = self.rebuild(relevant).await;
            log_failure(&result);
            on_pass(&result);
        }
        Ok(())
    }

    /// Changes that can affect the output. While a pass is failing every
    /// change counts, since a new file may be the missing dependency.
    fn relevant_changes(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        if self.graph.entries().is_empty() || !self.graph.pending().is_empty() {
            return paths;
        }
        paths
            .into_iter()
            .filter(|path| self.graph.contains(path))
            .collect()
    }

    fn invalidate(&mut self, path: &Path) {
        if let Some(cache) = &self.cache {
            cache.invalidate(path);
        }

        let Some(idx) = self.graph.get(path) else {
            return;
        };
        if self.runtime.is_file(path) {
            self.graph.mark_stale(path);
            return;
        }

        tracing::debug!("{} was removed", path.display());
        self.resolver.forget(path);
        for dependent in self.graph.dependents(idx) {
            let dependent = self.graph.node(dependent).path.clone();
            self.graph.mark_stale(&dependent);
        }
    }

    async fn pass(&mut self) -> Result<BuildReport> {
        let started = Instant::now();

        let mut stats = BuildStats::default();
        let built = GraphBuilder::new(
            &mut self.graph,
            &self.resolver,
            &self.pool,
            Arc::clone(&self.options),
            Arc::clone(&self.runtime),
        )
        .cache(self.cache.as_ref())
        .build_into(&mut stats)
        .await;

        // changes of a failed pass are reported by the next clean one
        self.unreported.extend(stats.changed.iter().copied());
        if let Err(err) = built {
            return Err(self.fail(err));
        }

        let tree = build_bundle_tree(&self.graph, &mut self.ids, &self.options.root_dir);
        let outcome = package_tree(
            PackageInputs {
                tree: &tree,
                graph: &self.graph,
                ids: &self.ids,
                options: &self.options,
                registry: &self.packagers,
            },
            &self.previous,
        )
        .await;

        self.previous = outcome
            .reports
            .iter()
            .map(|report| (report.name.clone(), report.clone()))
            .collect();
        let first_pass = self.tree.is_none();
        self.tree = Some(tree);

        if let Some(err) = outcome.errors.into_iter().next() {
            return Err(self.fail(err));
        }

        if !first_pass {
            self.emit_update();
        } else if let Some(hmr) = &self.hmr {
            // a clean first pass still clears an error from a failed start
            hmr.emit_update(Vec::new(), false);
        }
        self.unreported.clear();

        let report = BuildReport {
            bundles: outcome.reports,
            processed: stats.processed,
            cache_hits: stats.cache_hits,
            duration: started.elapsed(),
        };
        tracing::info!(
            "Built {} bundle(s) in {}ms ({} processed, {} from cache, {} written)",
            report.bundles.len(),
            report.duration.as_millis(),
            report.processed,
            report.cache_hits,
            report.packaged().count()
        );
        Ok(report)
    }

    fn fail(&self, err: Error) -> Error {
        if let Some(hmr) = &self.hmr {
            hmr.emit_error(&err);
        }
        err
    }

    /// Send the assets changed since the last clean pass to live clients.
    fn emit_update(&self) {
        let (Some(hmr), Some(tree)) = (&self.hmr, &self.tree) else {
            return;
        };

        let mut assets = Vec::new();
        let mut reload = false;
        for &idx in &self.unreported {
            let node = self.graph.node(idx);
            let Some(processed) = node.processed.as_ref() else {
                continue;
            };
            if processed.asset_type == AssetType::Html {
                reload = true;
                break;
            }
            match HmrAsset::from_node(&self.graph, &self.ids, tree, idx) {
                Some(asset) => assets.push(asset),
                // not part of any script bundle, e.g. a stylesheet linked from markup
                None => reload = true,
            }
        }
        hmr.emit_update(assets, reload);
    }
}

fn log_failure(result: &Result<BuildReport>) {
    if let Err(err) = result {
        match err.code_frame() {
            Some(frame) => tracing::error!("{}\n{}", err, frame),
            None => tracing::error!("{}", err),
        }
    }
}

//! Incremental graph construction.
//!
//! The coordinator keeps up to `pool.size()` files in flight, registers every
//! newly resolved dependency as it completes and queues only nodes that were
//! never seen. Cache reads happen here, before a file is handed to a worker.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use rustc_hash::FxHashSet;

use super::{AssetGraph, DepTarget, NodeIdx, NodeState, Registration, ResolvedDep};
use crate::asset::{Dependency, ProcessedAsset};
use crate::builtins;
use crate::cache::FsCache;
use crate::diagnostics::code_frame;
use crate::options::BundlerOptions;
use crate::resolver::Resolver;
use crate::runtime::Runtime;
use crate::worker::{WorkerPool, WorkerRequest};
use crate::{Error, Result};

/// Counters for one build pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Files run through a worker.
    pub processed: usize,
    /// Files restored from the persistent cache.
    pub cache_hits: usize,
    /// Nodes whose generated output differs from the previous pass.
    pub changed: Vec<NodeIdx>,
}

type InFlight<'a> = BoxFuture<'a, (NodeIdx, Result<ProcessedAsset>)>;

/// One build pass over an [`AssetGraph`].
pub struct GraphBuilder<'a> {
    graph: &'a mut AssetGraph,
    resolver: &'a Resolver,
    pool: &'a WorkerPool,
    cache: Option<&'a FsCache>,
    options: Arc<BundlerOptions>,
    runtime: Arc<dyn Runtime>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        graph: &'a mut AssetGraph,
        resolver: &'a Resolver,
        pool: &'a WorkerPool,
        options: Arc<BundlerOptions>,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        Self {
            graph,
            resolver,
            pool,
            cache: None,
            options,
            runtime,
        }
    }

    pub fn cache(mut self, cache: Option<&'a FsCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Process every pending node and everything newly reachable from it.
    ///
    /// A failure stops only its own branch; the remaining in-flight work still
    /// completes so its results land in the graph and the cache. The first
    /// error is returned once nothing is left in flight.
    pub async fn build(self) -> Result<BuildStats> {
        let mut stats = BuildStats::default();
        self.build_into(&mut stats).await?;
        Ok(stats)
    }

    /// [`build`](Self::build), recording counters in `stats` even when the
    /// pass fails.
    pub async fn build_into(mut self, stats: &mut BuildStats) -> Result<()> {
        if self.graph.entries().is_empty() {
            self.register_entries().await?;
        }

        let pool = self.pool;
        let mut errors: Vec<Error> = Vec::new();
        let mut queue: VecDeque<NodeIdx> = self.graph.pending().into();
        // every node queued in this pass, dispatched or not
        let mut scheduled: FxHashSet<NodeIdx> = queue.iter().copied().collect();
        let mut in_flight: FuturesUnordered<InFlight<'a>> = FuturesUnordered::new();

        loop {
            while in_flight.len() < pool.size() {
                let Some(idx) = queue.pop_front() else {
                    break;
                };
                let node = self.graph.node(idx);

                if let Some(cached) = self.cache.and_then(|cache| cache.read(&node.path)) {
                    stats.cache_hits += 1;
                    self.complete(idx, cached, stats, &mut queue, &mut scheduled, &mut errors)
                        .await;
                    continue;
                }

                let request = WorkerRequest {
                    path: node.path.clone(),
                    package: node.package.clone(),
                    options: Arc::clone(&self.options),
                };
                in_flight.push(Box::pin(async move { (idx, pool.run(request).await) }));
            }

            let Some((idx, result)) = in_flight.next().await else {
                if queue.is_empty() {
                    break;
                }
                continue;
            };

            match result {
                Ok(processed) => {
                    stats.processed += 1;
                    if let Some(cache) = self.cache {
                        cache.write(&self.graph.node(idx).path, &processed);
                    }
                    self.complete(idx, processed, stats, &mut queue, &mut scheduled, &mut errors)
                        .await;
                }
                Err(err) => {
                    tracing::debug!("Failed to process {}: {}", self.graph.node(idx).path.display(), err);
                    self.graph.node_mut(idx).state = NodeState::Failed;
                    errors.push(err);
                }
            }
        }

        if errors.len() > 1 {
            tracing::debug!("{} errors in this pass, reporting the first", errors.len());
        }
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn register_entries(&mut self) -> Result<()> {
        let mut entries = Vec::with_capacity(self.options.entries.len());
        for entry in &self.options.entries {
            let resolution = self
                .resolver
                .resolve(&entry.to_string_lossy(), None)
                .await?;
            let idx = self
                .graph
                .register(&resolution.path, resolution.package.clone())
                .idx();
            if !entries.contains(&idx) {
                entries.push(idx);
            }
        }
        self.graph.set_entries(entries);
        Ok(())
    }

    /// Store a result and resolve its dependencies.
    async fn complete(
        &mut self,
        idx: NodeIdx,
        processed: ProcessedAsset,
        stats: &mut BuildStats,
        queue: &mut VecDeque<NodeIdx>,
        scheduled: &mut FxHashSet<NodeIdx>,
        errors: &mut Vec<Error>,
    ) {
        let path = self.graph.node(idx).path.clone();

        let mut deps = Vec::with_capacity(processed.dependencies.len());
        let mut failed = false;
        for dependency in &processed.dependencies {
            match self.resolve_dependency(&path, dependency).await {
                Ok(target) => {
                    // a node still in flight is New too, so only the first
                    // discovery in this pass queues it
                    if let DepTarget::Asset(dep_idx) = &target {
                        if self.graph.node(*dep_idx).state == NodeState::New
                            && scheduled.insert(*dep_idx)
                        {
                            queue.push_back(*dep_idx);
                        }
                    }
                    deps.push(ResolvedDep {
                        dependency: dependency.clone(),
                        target,
                    });
                }
                Err(err) => {
                    failed = true;
                    errors.push(err);
                }
            }
        }

        let node = self.graph.node_mut(idx);
        let changed = node
            .processed
            .as_ref()
            .is_none_or(|previous| previous.hash != processed.hash);
        if changed {
            stats.changed.push(idx);
        }
        node.deps = deps;
        node.processed = Some(Arc::new(processed));
        node.state = if failed {
            NodeState::Failed
        } else {
            NodeState::Done
        };
    }

    async fn resolve_dependency(&mut self, from: &Path, dependency: &Dependency) -> Result<DepTarget> {
        if builtins::is_builtin(&dependency.specifier) {
            return Ok(DepTarget::Builtin(dependency.specifier.clone()));
        }

        let resolved = if dependency.meta.is_url {
            self.resolve_url(from, dependency)
        } else {
            self.resolver
                .resolve(&dependency.specifier, Some(from))
                .await
                .map(|resolution| (resolution.path.clone(), resolution.package.clone()))
        };

        match resolved {
            Ok((path, package)) => {
                let registration = self.graph.register(&path, package);
                if let Registration::New(_) = registration {
                    tracing::trace!("Discovered {}", path.display());
                }
                Ok(DepTarget::Asset(registration.idx()))
            }
            Err(Error::Resolution { .. }) if dependency.meta.optional => {
                tracing::debug!(
                    "Skipping optional dependency '{}' of {}",
                    dependency.specifier,
                    from.display()
                );
                Ok(DepTarget::Skipped)
            }
            Err(Error::Resolution { specifier, from, .. }) => Err(Error::Resolution {
                code_frame: self.frame_for(&from, dependency),
                specifier,
                from,
            }),
            Err(err) => Err(err),
        }
    }

    fn resolve_url(
        &self,
        from: &Path,
        dependency: &Dependency,
    ) -> Result<(PathBuf, Option<Arc<crate::resolver::PackageDescriptor>>)> {
        match dependency.meta.url_target.as_deref() {
            Some(target) if self.runtime.is_file(target) => {
                let package = target
                    .parent()
                    .and_then(|dir| self.resolver.package_for(dir));
                Ok((target.to_path_buf(), package))
            }
            _ => Err(Error::Resolution {
                specifier: dependency.specifier.clone(),
                from: from.to_path_buf(),
                code_frame: None,
            }),
        }
    }

    fn frame_for(&self, from: &Path, dependency: &Dependency) -> Option<String> {
        let loc = dependency.meta.loc?;
        let source = self.runtime.read_to_string(from).ok()?;
        Some(code_frame(&source, loc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetRegistry, AssetType};
    use crate::runtime::MemoryRuntime;

    struct Session {
        graph: AssetGraph,
        resolver: Resolver,
        pool: WorkerPool,
        options: Arc<BundlerOptions>,
        runtime: Arc<MemoryRuntime>,
    }

    impl Session {
        fn new(runtime: MemoryRuntime, entry: &str) -> Self {
            Self::with_workers(runtime, entry, 2)
        }

        fn with_workers(runtime: MemoryRuntime, entry: &str, workers: usize) -> Self {
            let runtime = Arc::new(runtime);
            let options = Arc::new(BundlerOptions::new([entry]).root_dir("/app").workers(workers));
            let resolver = Resolver::new(runtime.clone(), Arc::clone(&options));
            let pool = WorkerPool::new(workers, AssetRegistry::new(), runtime.clone()).unwrap();
            Self {
                graph: AssetGraph::new(),
                resolver,
                pool,
                options,
                runtime,
            }
        }

        async fn build(&mut self) -> Result<BuildStats> {
            GraphBuilder::new(
                &mut self.graph,
                &self.resolver,
                &self.pool,
                Arc::clone(&self.options),
                self.runtime.clone(),
            )
            .build()
            .await
        }
    }

    fn diamond() -> MemoryRuntime {
        MemoryRuntime::new()
            .with_file("/app/a.js", "require('./b'); require('./c');")
            .with_file("/app/b.js", "require('./d');")
            .with_file("/app/c.js", "require('./d');")
            .with_file("/app/d.js", "module.exports = 'd';")
    }

    #[tokio::test]
    async fn shared_dependencies_are_processed_once() {
        let mut session = Session::new(diamond(), "/app/a.js");
        let stats = session.build().await.unwrap();

        assert_eq!(stats.processed, 4);
        assert_eq!(session.pool.completed(), 4);
        assert_eq!(session.graph.len(), 4);

        let d = session.graph.get(Path::new("/app/d.js")).unwrap();
        let parents = session
            .graph
            .nodes()
            .filter(|(_, node)| node.asset_deps().any(|(_, idx)| idx == d))
            .count();
        assert_eq!(parents, 2);
    }

    #[tokio::test]
    async fn concurrent_branches_share_one_dispatch() {
        // four siblings in flight together all discover the same leaf
        let runtime = MemoryRuntime::new()
            .with_file(
                "/app/a.js",
                "require('./b1'); require('./b2'); require('./b3'); require('./b4');",
            )
            .with_file("/app/b1.js", "require('./shared');")
            .with_file("/app/b2.js", "require('./shared');")
            .with_file("/app/b3.js", "require('./shared');")
            .with_file("/app/b4.js", "require('./shared');")
            .with_file("/app/shared.js", "require('./leaf');")
            .with_file("/app/leaf.js", "module.exports = 'leaf';");
        let mut session = Session::with_workers(runtime, "/app/a.js", 4);
        let stats = session.build().await.unwrap();

        assert_eq!(session.graph.len(), 7);
        assert_eq!(stats.processed, session.graph.len());
        assert_eq!(session.pool.completed(), session.graph.len());

        let shared = session.graph.get(Path::new("/app/shared.js")).unwrap();
        assert_eq!(session.graph.dependents(shared).len(), 4);
        assert_eq!(session.graph.node(shared).state, NodeState::Done);
    }

    #[tokio::test]
    async fn rebuild_only_processes_stale_nodes() {
        let mut session = Session::new(diamond(), "/app/a.js");
        session.build().await.unwrap();

        session.runtime.insert("/app/d.js", "module.exports = 'D';");
        session.graph.mark_stale(Path::new("/app/d.js"));
        let stats = session.build().await.unwrap();

        let d = session.graph.get(Path::new("/app/d.js")).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.changed, vec![d]);
        assert_eq!(
            session.graph.node(d).processed.as_ref().unwrap().output(&AssetType::Js),
            Some("module.exports = 'D';")
        );
    }

    #[tokio::test]
    async fn unresolved_dependency_fails_with_a_code_frame() {
        let runtime = MemoryRuntime::new()
            .with_file("/app/a.js", "require('./b');\nrequire('./missing');\n")
            .with_file("/app/b.js", "module.exports = 1;");
        let mut session = Session::new(runtime, "/app/a.js");

        let err = session.build().await.unwrap_err();
        assert!(matches!(err, Error::Resolution { ref specifier, .. } if specifier == "./missing"));
        assert!(err.code_frame().unwrap().contains("> 2 | require('./missing');"));

        // the healthy branch still completed
        let b = session.graph.get(Path::new("/app/b.js")).unwrap();
        assert_eq!(session.graph.node(b).state, NodeState::Done);
        let a = session.graph.get(Path::new("/app/a.js")).unwrap();
        assert_eq!(session.graph.node(a).state, NodeState::Failed);
    }

    #[tokio::test]
    async fn optional_dependencies_may_be_missing() {
        let runtime = MemoryRuntime::new().with_file(
            "/app/a.js",
            "try { require('optional-peer'); } catch (e) {}\nmodule.exports = 1;",
        );
        let mut session = Session::new(runtime, "/app/a.js");
        session.build().await.unwrap();

        let a = session.graph.get(Path::new("/app/a.js")).unwrap();
        assert_eq!(session.graph.node(a).deps[0].target, DepTarget::Skipped);
    }

    #[tokio::test]
    async fn failed_nodes_are_retried_on_the_next_pass() {
        let runtime = MemoryRuntime::new().with_file("/app/a.js", "require('./b');");
        let mut session = Session::new(runtime, "/app/a.js");
        assert!(session.build().await.is_err());

        session.runtime.insert("/app/b.js", "module.exports = 2;");
        let stats = session.build().await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(session.graph.len(), 2);
    }
}

//! The asset graph owned by the coordinator.
//!
//! Nodes are stored in an arena and addressed by [`NodeIdx`]; a path maps to
//! exactly one node for the lifetime of a session. Registration is the only
//! way to create nodes and the first registration of a path wins, so two
//! branches that discover the same file attach to the same node.

mod builder;
mod ids;

pub use builder::{BuildStats, GraphBuilder};
pub use ids::{ModuleId, ModuleIds};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::asset::{Dependency, ProcessedAsset};
use crate::resolver::PackageDescriptor;

/// Index of a node in the [`AssetGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(u32);

impl NodeIdx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Processing state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Registered, never processed.
    New,
    /// Processed before, source changed since.
    Stale,
    Done,
    /// Processing or resolving one of its dependencies failed.
    Failed,
}

/// Where a dependency edge points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepTarget {
    Asset(NodeIdx),
    /// A runtime module embedded by the script packager.
    Builtin(String),
    /// An optional dependency that did not resolve.
    Skipped,
}

/// A dependency record with its resolved target.
#[derive(Debug, Clone)]
pub struct ResolvedDep {
    pub dependency: Dependency,
    pub target: DepTarget,
}

/// One file in the graph.
#[derive(Debug, Clone)]
pub struct AssetNode {
    pub path: PathBuf,
    pub package: Option<Arc<PackageDescriptor>>,
    pub state: NodeState,
    pub processed: Option<Arc<ProcessedAsset>>,
    pub deps: Vec<ResolvedDep>,
}

impl AssetNode {
    /// Asset targets of this node's edges, with the dependency that produced each.
    pub fn asset_deps(&self) -> impl Iterator<Item = (&Dependency, NodeIdx)> + '_ {
        self.deps.iter().filter_map(|dep| match dep.target {
            DepTarget::Asset(idx) => Some((&dep.dependency, idx)),
            _ => None,
        })
    }
}

/// Outcome of [`AssetGraph::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New(NodeIdx),
    Existing(NodeIdx),
}

impl Registration {
    pub fn idx(self) -> NodeIdx {
        match self {
            Registration::New(idx) | Registration::Existing(idx) => idx,
        }
    }
}

/// Arena of asset nodes indexed by absolute path.
#[derive(Debug, Default)]
pub struct AssetGraph {
    nodes: Vec<AssetNode>,
    index: FxHashMap<PathBuf, NodeIdx>,
    entries: Vec<NodeIdx>,
}

impl AssetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`, or return the node that already owns it.
    ///
    /// An existing node keeps its package descriptor and state.
    pub fn register(
        &mut self,
        path: &Path,
        package: Option<Arc<PackageDescriptor>>,
    ) -> Registration {
        if let Some(&idx) = self.index.get(path) {
            return Registration::Existing(idx);
        }

        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(AssetNode {
            path: path.to_path_buf(),
            package,
            state: NodeState::New,
            processed: None,
            deps: Vec::new(),
        });
        self.index.insert(path.to_path_buf(), idx);
        Registration::New(idx)
    }

    pub fn get(&self, path: &Path) -> Option<NodeIdx> {
        self.index.get(path).copied()
    }

    pub fn node(&self, idx: NodeIdx) -> &AssetNode {
        &self.nodes[idx.index()]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut AssetNode {
        &mut self.nodes[idx.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &AssetNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIdx(i as u32), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn entries(&self) -> &[NodeIdx] {
        &self.entries
    }

    pub fn set_entries(&mut self, entries: Vec<NodeIdx>) {
        self.entries = entries;
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    /// Mark a processed node for reprocessing. Returns `false` for unknown paths.
    pub fn mark_stale(&mut self, path: &Path) -> bool {
        match self.index.get(path) {
            Some(&idx) => {
                let node = &mut self.nodes[idx.index()];
                if node.state == NodeState::Done {
                    node.state = NodeState::Stale;
                }
                true
            }
            None => false,
        }
    }

    /// Nodes with a resolved edge to `target`.
    pub fn dependents(&self, target: NodeIdx) -> Vec<NodeIdx> {
        self.nodes()
            .filter(|(_, node)| node.asset_deps().any(|(_, dep)| dep == target))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Nodes that need processing, in registration order.
    pub fn pending(&self) -> Vec<NodeIdx> {
        self.nodes()
            .filter(|(_, node)| node.state != NodeState::Done)
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str) -> Option<Arc<PackageDescriptor>> {
        PackageDescriptor::parse(Path::new("/app"), &format!(r#"{{"name": "{name}"}}"#))
            .ok()
            .map(Arc::new)
    }

    #[test]
    fn first_registration_wins() {
        let mut graph = AssetGraph::new();
        let path = Path::new("/app/shared.js");

        let first = graph.register(path, package("first"));
        let second = graph.register(path, package("second"));

        assert!(matches!(first, Registration::New(_)));
        assert_eq!(second, Registration::Existing(first.idx()));
        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.node(first.idx()).package.as_ref().and_then(|p| p.name.as_deref()),
            Some("first")
        );
    }

    #[test]
    fn only_processed_nodes_become_stale() {
        let mut graph = AssetGraph::new();
        let a = graph.register(Path::new("/app/a.js"), None).idx();
        let b = graph.register(Path::new("/app/b.js"), None).idx();
        graph.node_mut(a).state = NodeState::Done;
        graph.node_mut(b).state = NodeState::Done;

        assert!(graph.mark_stale(Path::new("/app/a.js")));
        assert!(!graph.mark_stale(Path::new("/app/unknown.js")));

        assert_eq!(graph.node(a).state, NodeState::Stale);
        assert_eq!(graph.pending(), vec![a]);
    }
}

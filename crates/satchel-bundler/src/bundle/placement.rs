//! Depth-first placement of graph nodes into bundles.

use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{BundleId, BundleTree};
use crate::asset::{AssetType, Dependency};
use crate::graph::{AssetGraph, ModuleIds, NodeIdx};

/// Build the bundle tree for the graph's entries.
///
/// Module ids are handed out as assets join script bundles, in traversal
/// order; ids already known to `ids` are kept.
pub fn build_bundle_tree(graph: &AssetGraph, ids: &mut ModuleIds, root_dir: &std::path::Path) -> BundleTree {
    let mut placement = Placement {
        graph,
        ids,
        tree: BundleTree::new(root_dir),
        home: FxHashMap::default(),
        member_of: FxHashMap::default(),
        on_path: FxHashSet::default(),
    };

    for &entry in graph.entries() {
        let node = graph.node(entry);
        let Some(processed) = node.processed.as_ref() else {
            continue;
        };
        let root = placement
            .tree
            .create_root(entry, &node.path, processed.asset_type.clone());
        placement.place(entry, root, None);
    }

    placement.tree
}

struct Placement<'a> {
    graph: &'a AssetGraph,
    ids: &'a mut ModuleIds,
    tree: BundleTree,
    /// Bundle each asset was placed from.
    home: FxHashMap<NodeIdx, BundleId>,
    /// Every bundle each asset is a member of.
    member_of: FxHashMap<NodeIdx, IndexSet<BundleId>>,
    /// Bundles on the current traversal path.
    on_path: FxHashSet<BundleId>,
}

impl Placement<'_> {
    fn place(&mut self, idx: NodeIdx, bundle: BundleId, dep: Option<&Dependency>) {
        let graph = self.graph;
        let node = graph.node(idx);
        let Some(processed) = node.processed.as_ref() else {
            return;
        };

        if let Some(&home) = self.home.get(&idx) {
            if home == bundle {
                return;
            }
            if let Some(common) = self.tree.find_common_ancestor(bundle, home) {
                let home_type = &self.tree.bundle(home).bundle_type;
                if common != home && *home_type == self.tree.bundle(common).bundle_type {
                    self.move_to(idx, common);
                    return;
                }
            }
            if self.on_path.contains(&home) {
                return;
            }
        }

        let is_entry = self
            .home
            .get(&idx)
            .is_some_and(|&home| self.tree.bundle(home).entry_asset == Some(idx));
        let mut bundle = bundle;

        if dep.is_some_and(|d| d.dynamic) {
            // already the entry of its own bundle
            if is_entry {
                return;
            }
            let url = dep.is_some_and(|d| d.meta.is_url);
            bundle = self.tree.create_child_bundle(
                bundle,
                idx,
                &node.path,
                processed.asset_type.clone(),
                url,
            );
            self.add(bundle, idx);
        } else {
            let bundle_type = self.tree.bundle(bundle).bundle_type.clone();
            if processed.generated.contains_key(&bundle_type) {
                self.add(bundle, idx);
            }
            let own = self.tree.get_sibling_bundle(bundle, &processed.asset_type);
            self.add(own, idx);
        }

        self.home.insert(idx, bundle);
        let fresh = self.on_path.insert(bundle);
        for (dependency, target) in node.asset_deps() {
            self.place(target, bundle, Some(dependency));
        }
        if fresh {
            self.on_path.remove(&bundle);
        }
    }

    /// Move a shared asset, and its dependencies living in the same bundle,
    /// into `common`. Bundle entries stay where they are.
    fn move_to(&mut self, idx: NodeIdx, common: BundleId) {
        let Some(&old_home) = self.home.get(&idx) else {
            return;
        };
        if self.tree.bundle(old_home).entry_asset == Some(idx) {
            return;
        }

        let members = self.member_of.remove(&idx).unwrap_or_default();
        for member in members {
            let bundle_type = self.tree.bundle(member).bundle_type.clone();
            self.tree.remove_asset(member, idx);
            let target = self.tree.get_sibling_bundle(common, &bundle_type);
            self.add(target, idx);
        }
        self.home.insert(idx, common);

        let graph = self.graph;
        for (_, dep) in graph.node(idx).asset_deps() {
            if self.home.get(&dep) == Some(&old_home) {
                self.move_to(dep, common);
            }
        }
    }

    fn add(&mut self, bundle: BundleId, idx: NodeIdx) {
        self.tree.insert_asset(bundle, idx);
        self.member_of.entry(idx).or_default().insert(bundle);
        if self.tree.bundle(bundle).bundle_type == AssetType::Js {
            self.ids.assign(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::asset::{Generated, ProcessedAsset, hash_generated};
    use crate::graph::{DepTarget, NodeState, ResolvedDep};

    /// Hand-built graphs: `(path, type, generated types, deps)`.
    struct Fixture {
        graph: AssetGraph,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: AssetGraph::new(),
            }
        }

        fn asset(&mut self, path: &str, asset_type: AssetType, outputs: &[AssetType]) -> NodeIdx {
            let idx = self.graph.register(Path::new(path), None).idx();
            let mut generated = Generated::new();
            for output in outputs {
                generated.insert(output.clone(), format!("/* {path} */"));
            }
            let node = self.graph.node_mut(idx);
            node.processed = Some(Arc::new(ProcessedAsset {
                asset_type,
                dependencies: Vec::new(),
                hash: hash_generated(&generated),
                generated,
            }));
            node.state = NodeState::Done;
            idx
        }

        fn js(&mut self, path: &str) -> NodeIdx {
            self.asset(path, AssetType::Js, &[AssetType::Js])
        }

        fn link(&mut self, from: NodeIdx, to: NodeIdx, dependency: Dependency) {
            self.graph.node_mut(from).deps.push(ResolvedDep {
                dependency,
                target: DepTarget::Asset(to),
            });
        }

        fn tree(&mut self, entries: Vec<NodeIdx>) -> (BundleTree, ModuleIds) {
            self.graph.set_entries(entries);
            let mut ids = ModuleIds::new();
            let tree = build_bundle_tree(&self.graph, &mut ids, Path::new("/app"));
            (tree, ids)
        }
    }

    fn names(tree: &BundleTree) -> Vec<&str> {
        tree.bundles().map(|b| b.name.as_str()).collect()
    }

    #[test]
    fn static_dependencies_share_the_entry_bundle() {
        let mut f = Fixture::new();
        let main = f.js("/app/main.js");
        let util = f.js("/app/util.js");
        f.link(main, util, Dependency::new("./util"));

        let (tree, ids) = f.tree(vec![main]);
        assert_eq!(names(&tree), ["main.js"]);
        let root = tree.roots()[0];
        assert_eq!(tree.bundle(root).assets.iter().copied().collect::<Vec<_>>(), [main, util]);
        assert_eq!(ids.get(main), Some(crate::graph::ModuleId::Asset(1)));
        assert_eq!(ids.get(util), Some(crate::graph::ModuleId::Asset(2)));
    }

    #[test]
    fn dynamic_imports_open_child_bundles() {
        let mut f = Fixture::new();
        let main = f.js("/app/main.js");
        let lazy = f.js("/app/lazy.js");
        f.link(main, lazy, Dependency::dynamic("./lazy"));

        let (tree, _) = f.tree(vec![main]);
        let root = tree.roots()[0];
        let child = tree.child_for(root, lazy).unwrap();

        assert_eq!(tree.bundle(child).name, "lazy.js");
        assert_eq!(tree.bundle(child).entry_asset, Some(lazy));
        assert!(!tree.bundle(root).assets.contains(&lazy));
    }

    #[test]
    fn stylesheets_go_to_a_sibling_and_keep_a_script_stub() {
        let mut f = Fixture::new();
        let main = f.js("/app/main.js");
        let style = f.asset("/app/style.css", AssetType::Css, &[AssetType::Css, AssetType::Js]);
        f.link(main, style, Dependency::new("./style.css"));

        let (tree, _) = f.tree(vec![main]);
        let root = tree.roots()[0];
        let css = tree.bundle(root).siblings[&AssetType::Css];

        assert_eq!(tree.bundle(css).name, "main.css");
        assert!(tree.bundle(css).assets.contains(&style));
        assert!(tree.bundle(root).assets.contains(&style));
    }

    #[test]
    fn shared_assets_move_to_the_common_ancestor() {
        let mut f = Fixture::new();
        let main = f.js("/app/main.js");
        let a = f.js("/app/a.js");
        let b = f.js("/app/b.js");
        let shared = f.js("/app/shared.js");
        let helper = f.js("/app/helper.js");
        f.link(main, a, Dependency::dynamic("./a"));
        f.link(main, b, Dependency::dynamic("./b"));
        f.link(a, shared, Dependency::new("./shared"));
        f.link(b, shared, Dependency::new("./shared"));
        f.link(shared, helper, Dependency::new("./helper"));

        let (tree, _) = f.tree(vec![main]);
        let root = tree.roots()[0];
        let a_bundle = tree.child_for(root, a).unwrap();
        let b_bundle = tree.child_for(root, b).unwrap();

        for asset in [shared, helper] {
            assert!(tree.bundle(root).assets.contains(&asset));
            assert!(!tree.bundle(a_bundle).assets.contains(&asset));
            assert!(!tree.bundle(b_bundle).assets.contains(&asset));
        }
    }

    #[test]
    fn bundle_entries_are_never_moved() {
        let mut f = Fixture::new();
        let main = f.js("/app/main.js");
        let lazy = f.js("/app/lazy.js");
        let other = f.js("/app/other.js");
        f.link(main, lazy, Dependency::dynamic("./lazy"));
        f.link(main, other, Dependency::dynamic("./other"));
        f.link(other, lazy, Dependency::new("./lazy"));

        let (tree, _) = f.tree(vec![main]);
        let root = tree.roots()[0];
        let child = tree.child_for(root, lazy).unwrap();
        assert!(tree.bundle(child).assets.contains(&lazy));
        assert!(!tree.bundle(root).assets.contains(&lazy));
    }

    #[test]
    fn circular_dynamic_imports_terminate() {
        let mut f = Fixture::new();
        let a = f.js("/app/a.js");
        let b = f.js("/app/b.js");
        f.link(a, b, Dependency::dynamic("./b"));
        f.link(b, a, Dependency::dynamic("./a"));

        let (tree, _) = f.tree(vec![a]);
        assert_eq!(names(&tree), ["a.js", "b.js"]);
    }

    #[test]
    fn url_references_open_hashed_children() {
        let mut f = Fixture::new();
        let page = f.asset("/app/index.html", AssetType::Html, &[AssetType::Html]);
        let script = f.js("/app/index.js");
        f.link(
            page,
            script,
            Dependency::url("./index.js", "/app/index.js".into()),
        );

        let (tree, _) = f.tree(vec![page]);
        let root = tree.roots()[0];
        let child = tree.child_for(root, script).unwrap();
        assert_eq!(tree.bundle(root).name, "index.html");
        assert!(tree.bundle(child).name.starts_with("index."));
        assert!(tree.bundle(child).name.ends_with(".js"));
        assert_ne!(tree.bundle(child).name, "index.js");
    }
}

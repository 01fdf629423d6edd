//! Output bundles and the tree relating them.
//!
//! Each entry file roots a tree. Dynamic imports and URL references open
//! child bundles; assets of another output type go to sibling bundles, which
//! are children of the bundle that asked for them.

mod placement;

pub use placement::build_bundle_tree;

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;

use crate::asset::AssetType;
use crate::graph::{AssetGraph, NodeIdx};
use crate::naming;

/// Index of a bundle in its [`BundleTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(u32);

impl BundleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named output unit of a single type.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: BundleId,
    /// Output file name relative to `out_dir`.
    pub name: String,
    pub bundle_type: AssetType,
    /// Member assets in inclusion order.
    pub assets: IndexSet<NodeIdx>,
    /// The asset the bundle was created for, if any.
    pub entry_asset: Option<NodeIdx>,
    pub parent: Option<BundleId>,
    pub children: IndexSet<BundleId>,
    pub siblings: IndexMap<AssetType, BundleId>,
}

impl Bundle {
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Arena of bundles for one build pass.
#[derive(Debug, Clone)]
pub struct BundleTree {
    bundles: Vec<Bundle>,
    roots: Vec<BundleId>,
    names: FxHashSet<String>,
    root_dir: PathBuf,
}

impl BundleTree {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundles: Vec::new(),
            roots: Vec::new(),
            names: FxHashSet::default(),
            root_dir: root_dir.into(),
        }
    }

    /// Create the root bundle for an entry file.
    pub fn create_root(&mut self, entry: NodeIdx, path: &Path, bundle_type: AssetType) -> BundleId {
        let name = naming::entry_bundle_name(path, &bundle_type);
        let id = self.push(name, path, bundle_type, None, Some(entry));
        self.roots.push(id);
        id
    }

    /// Open a child bundle of `parent` whose entry is `entry`.
    ///
    /// URL-referenced children use the path-hashed name the referencing asset
    /// already rewrote its reference to.
    pub fn create_child_bundle(
        &mut self,
        parent: BundleId,
        entry: NodeIdx,
        path: &Path,
        bundle_type: AssetType,
        url: bool,
    ) -> BundleId {
        let name = if url {
            naming::url_bundle_name(path, &self.root_dir, &bundle_type)
        } else {
            naming::entry_bundle_name(path, &bundle_type)
        };
        let id = self.push(name, path, bundle_type, Some(parent), Some(entry));
        self.bundles[parent.index()].children.insert(id);
        id
    }

    /// The bundle of `bundle_type` co-located with `id`: `id` itself when the
    /// types match, otherwise a sibling created on first request.
    pub fn get_sibling_bundle(&mut self, id: BundleId, bundle_type: &AssetType) -> BundleId {
        let bundle = &self.bundles[id.index()];
        if bundle.bundle_type == *bundle_type {
            return id;
        }
        if let Some(&sibling) = bundle.siblings.get(bundle_type) {
            return sibling;
        }

        let name = naming::sibling_bundle_name(&bundle.name, bundle_type);
        // collisions are disambiguated by the parent's name
        let anchor = PathBuf::from(&bundle.name);
        let sibling = self.push(name, &anchor, bundle_type.clone(), Some(id), None);

        let bundle = &mut self.bundles[id.index()];
        bundle.siblings.insert(bundle_type.clone(), sibling);
        bundle.children.insert(sibling);
        sibling
    }

    /// Lowest bundle that is an ancestor of (or equal to) both `a` and `b`.
    /// `None` when they live in different trees.
    pub fn find_common_ancestor(&self, a: BundleId, b: BundleId) -> Option<BundleId> {
        let chain: Vec<BundleId> = self.ancestors(a).collect();
        self.ancestors(b).find(|candidate| chain.contains(candidate))
    }

    /// `id` followed by its parent chain up to the root.
    pub fn ancestors(&self, id: BundleId) -> impl Iterator<Item = BundleId> + '_ {
        std::iter::successors(Some(id), |current| self.bundles[current.index()].parent)
    }

    /// Content hash of a bundle: its assets' hashes folded in inclusion order.
    pub fn bundle_hash(&self, id: BundleId, graph: &AssetGraph) -> String {
        let bundle = &self.bundles[id.index()];
        fold_hashes(bundle.assets.iter().map(|&idx| {
            graph
                .node(idx)
                .processed
                .as_ref()
                .map(|processed| processed.hash.as_str())
                .unwrap_or_default()
        }))
    }

    pub fn bundle(&self, id: BundleId) -> &Bundle {
        &self.bundles[id.index()]
    }

    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> + '_ {
        self.bundles.iter()
    }

    pub fn roots(&self) -> &[BundleId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Child bundle of `parent` created for `entry`, if any.
    pub fn child_for(&self, parent: BundleId, entry: NodeIdx) -> Option<BundleId> {
        self.bundles[parent.index()]
            .children
            .iter()
            .copied()
            .find(|&child| self.bundles[child.index()].entry_asset == Some(entry))
    }

    pub(crate) fn insert_asset(&mut self, id: BundleId, asset: NodeIdx) -> bool {
        self.bundles[id.index()].assets.insert(asset)
    }

    pub(crate) fn remove_asset(&mut self, id: BundleId, asset: NodeIdx) {
        self.bundles[id.index()].assets.shift_remove(&asset);
    }

    fn push(
        &mut self,
        name: String,
        path: &Path,
        bundle_type: AssetType,
        parent: Option<BundleId>,
        entry_asset: Option<NodeIdx>,
    ) -> BundleId {
        let name = if self.names.contains(&name) {
            naming::disambiguate(&name, path, &self.root_dir)
        } else {
            name
        };
        self.names.insert(name.clone());

        let id = BundleId(self.bundles.len() as u32);
        self.bundles.push(Bundle {
            id,
            name,
            bundle_type,
            assets: IndexSet::new(),
            entry_asset,
            parent,
            children: IndexSet::new(),
            siblings: IndexMap::new(),
        });
        id
    }
}

/// Fold asset hashes into one digest. Order-sensitive.
pub fn fold_hashes<'a>(hashes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for hash in hashes {
        hasher.update(hash.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn node(graph: &mut AssetGraph, path: &str) -> NodeIdx {
        graph.register(Path::new(path), None).idx()
    }

    #[test]
    fn sibling_bundles_are_created_once() {
        let mut graph = AssetGraph::new();
        let entry = node(&mut graph, "/app/main.js");

        let mut tree = BundleTree::new("/app");
        let main = tree.create_root(entry, Path::new("/app/main.js"), AssetType::Js);

        assert_eq!(tree.get_sibling_bundle(main, &AssetType::Js), main);
        let css = tree.get_sibling_bundle(main, &AssetType::Css);
        assert_eq!(tree.get_sibling_bundle(main, &AssetType::Css), css);

        assert_eq!(tree.bundle(css).name, "main.css");
        assert_eq!(tree.bundle(css).parent, Some(main));
        assert!(tree.bundle(main).children.contains(&css));
    }

    #[test]
    fn common_ancestor_walks_parent_chains() {
        let mut graph = AssetGraph::new();
        let main_js = node(&mut graph, "/app/main.js");
        let a_js = node(&mut graph, "/app/a.js");
        let b_js = node(&mut graph, "/app/b.js");
        let other_js = node(&mut graph, "/app/other.js");

        let mut tree = BundleTree::new("/app");
        let main = tree.create_root(main_js, Path::new("/app/main.js"), AssetType::Js);
        let a = tree.create_child_bundle(main, a_js, Path::new("/app/a.js"), AssetType::Js, false);
        let b = tree.create_child_bundle(a, b_js, Path::new("/app/b.js"), AssetType::Js, false);
        let other = tree.create_root(other_js, Path::new("/app/other.js"), AssetType::Js);

        assert_eq!(tree.find_common_ancestor(b, a), Some(a));
        assert_eq!(tree.find_common_ancestor(a, b), Some(a));
        assert_eq!(tree.find_common_ancestor(b, main), Some(main));
        assert_eq!(tree.find_common_ancestor(b, other), None);
        assert_eq!(tree.child_for(main, a_js), Some(a));
    }

    #[test]
    fn colliding_names_get_a_path_hash() {
        let mut graph = AssetGraph::new();
        let first = node(&mut graph, "/app/pages/index.js");
        let second = node(&mut graph, "/app/admin/index.js");

        let mut tree = BundleTree::new("/app");
        let a = tree.create_root(first, Path::new("/app/pages/index.js"), AssetType::Js);
        let b = tree.create_root(second, Path::new("/app/admin/index.js"), AssetType::Js);

        assert_eq!(tree.bundle(a).name, "index.js");
        assert_ne!(tree.bundle(b).name, "index.js");
        assert!(tree.bundle(b).name.starts_with("index."));
        assert!(tree.bundle(b).name.ends_with(".js"));
    }

    #[test]
    fn url_children_use_hashed_names() {
        let mut graph = AssetGraph::new();
        let page = node(&mut graph, "/app/index.html");
        let style = node(&mut graph, "/app/style.css");

        let mut tree = BundleTree::new("/app");
        let root = tree.create_root(page, Path::new("/app/index.html"), AssetType::Html);
        let css = tree.create_child_bundle(root, style, Path::new("/app/style.css"), AssetType::Css, true);

        assert_eq!(
            tree.bundle(css).name,
            naming::url_bundle_name(Path::new("/app/style.css"), Path::new("/app"), &AssetType::Css)
        );
    }

    proptest! {
        #[test]
        fn bundle_hash_changes_iff_an_asset_hash_changes(
            hashes in prop::collection::vec("[0-9a-f]{16}", 1..8),
            index in any::<prop::sample::Index>(),
            replacement in "[0-9a-f]{16}",
        ) {
            let original = fold_hashes(hashes.iter().map(String::as_str));
            prop_assert_eq!(&original, &fold_hashes(hashes.iter().map(String::as_str)));

            let mut changed = hashes.clone();
            let i = index.index(changed.len());
            changed[i] = replacement.clone();
            let folded = fold_hashes(changed.iter().map(String::as_str));

            prop_assert_eq!(folded == original, replacement == hashes[i]);
        }
    }
}

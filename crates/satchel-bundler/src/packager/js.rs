use async_trait::async_trait;
use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};

use super::{BundleWriter, PackageContext, Packager};
use crate::asset::AssetType;
use crate::bundle::{BundleId, BundleTree};
use crate::builtins::{
    self, BUNDLE_LOADER, CSS_LOADER, HMR_RUNTIME, HMR_URL_PLACEHOLDER, JS_LOADER,
    PUBLIC_URL_PLACEHOLDER,
};
use crate::graph::{AssetGraph, DepTarget, ModuleId, ModuleIds, NodeIdx};
use crate::options::BundlerOptions;
use crate::Result;

/// Builtins that only the outermost script bundle of a tree carries.
const ROOT_OWNED: &[&str] = &[BUNDLE_LOADER, JS_LOADER, CSS_LOADER];

/// Writes script bundles as a `satchelRequire` module registry.
///
/// Each module is `id:[function(require,module,exports){…},{specifier: target}]`
/// where a deferred target is `[bundle names…, id]`. A module whose code and
/// dependency map match one already written is skipped, and dependents in
/// the same bundle point at the first copy. Under HMR every module is
/// written so it stays individually replaceable.
#[derive(Debug)]
pub struct JsPackager {
    first: bool,
    dedupe: FxHashMap<String, ModuleId>,
    /// Skipped duplicates and the id they resolve to.
    aliases: FxHashMap<NodeIdx, ModuleId>,
    written: FxHashSet<NodeIdx>,
    builtins: IndexSet<String>,
}

impl Default for JsPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl JsPackager {
    pub fn new() -> Self {
        Self {
            first: true,
            dedupe: FxHashMap::default(),
            aliases: FxHashMap::default(),
            written: FxHashSet::default(),
            builtins: IndexSet::new(),
        }
    }

    async fn write_module(
        &mut self,
        out: &mut BundleWriter,
        id: &ModuleId,
        body: &str,
        deps: &str,
    ) -> Result<()> {
        let separator = if self.first { "" } else { "," };
        self.first = false;
        out.write_str(&format!(
            "{separator}{}:[function(require,module,exports) {{\n{body}\n}},{deps}]",
            id.to_js()
        ))
        .await
    }

    /// A duplicate can be left out only when nothing outside this bundle
    /// requires it and no module already written refers to its own id.
    fn can_skip(&self, cx: &PackageContext<'_>, asset: NodeIdx) -> bool {
        cx.bundle.entry_asset != Some(asset)
            && cx.graph.dependents(asset).iter().all(|dependent| {
                cx.bundle.assets.contains(dependent) && !self.written.contains(dependent)
            })
    }
}

/// Registry dependency map of `asset`, shared by script bundles and live updates.
///
/// A static target maps to its module id, or to the id `canonical` returns
/// for it when it was deduplicated. A deferred target maps to the bundle
/// files to load followed by its id. `from` is the bundle being written,
/// whose own child bundles are preferred.
pub(crate) fn dependency_map(
    tree: &BundleTree,
    graph: &AssetGraph,
    ids: &ModuleIds,
    from: Option<BundleId>,
    asset: NodeIdx,
    canonical: impl Fn(NodeIdx) -> Option<ModuleId>,
) -> Map<String, Value> {
    let mut deps = Map::new();

    for resolved in &graph.node(asset).deps {
        let dependency = &resolved.dependency;
        let value = match &resolved.target {
            DepTarget::Builtin(name) => Value::String(name.clone()),
            // URL references are rewritten to public URLs, not required
            DepTarget::Asset(_) if dependency.meta.is_url => continue,
            DepTarget::Asset(target) => {
                let deferred = dependency
                    .dynamic
                    .then(|| entry_bundle(tree, from, *target))
                    .flatten();
                match deferred {
                    Some(child) => {
                        let Some(id) = ids.get(*target) else {
                            continue;
                        };
                        let mut list: Vec<Value> = bundle_names(tree, child)
                            .into_iter()
                            .map(Value::String)
                            .collect();
                        list.push(id_value(&id));
                        Value::Array(list)
                    }
                    None => {
                        let Some(id) = canonical(*target).or_else(|| ids.get(*target)) else {
                            continue;
                        };
                        id_value(&id)
                    }
                }
            }
            DepTarget::Skipped => continue,
        };
        deps.insert(dependency.specifier.clone(), value);
    }

    deps
}

#[async_trait]
impl Packager for JsPackager {
    async fn start(&mut self, cx: &PackageContext<'_>, out: &mut BundleWriter) -> Result<()> {
        out.write_str(builtins::prelude(cx.options.minify)).await
    }

    async fn add_asset(
        &mut self,
        cx: &PackageContext<'_>,
        out: &mut BundleWriter,
        asset: NodeIdx,
    ) -> Result<()> {
        let (Some(processed), Some(id)) = (cx.processed(asset), cx.ids.get(asset)) else {
            return Ok(());
        };
        for resolved in &cx.graph.node(asset).deps {
            if let DepTarget::Builtin(name) = &resolved.target {
                self.builtins.insert(name.clone());
            }
        }

        let code = processed.output(&AssetType::Js).unwrap_or_default();
        let deps = dependency_map(cx.tree, cx.graph, cx.ids, Some(cx.bundle.id), asset, |target| {
            self.aliases.get(&target).cloned()
        });
        let deps = Value::Object(deps).to_string();

        if !cx.options.hmr {
            let mut hasher = blake3::Hasher::new();
            hasher.update(code.as_bytes());
            hasher.update(b"\0");
            hasher.update(deps.as_bytes());
            let key = hasher.finalize().to_hex().to_string();

            match self.dedupe.get(&key).cloned() {
                Some(original) if self.can_skip(cx, asset) => {
                    tracing::trace!("Module {} duplicates {}", id, original);
                    self.aliases.insert(asset, original);
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    self.dedupe.insert(key, id.clone());
                }
            }
        }

        self.written.insert(asset);
        self.write_module(out, &id, code, &deps).await
    }

    async fn end(&mut self, cx: &PackageContext<'_>, out: &mut BundleWriter) -> Result<()> {
        let mut entries = Vec::new();
        let mut loader_registration = None;

        if is_script_root(cx) {
            if cx.options.hmr {
                self.builtins.insert(HMR_RUNTIME.to_string());
                entries.push(ModuleId::Builtin(HMR_RUNTIME.to_string()));
            }

            let loaders = loader_modules(cx);
            if !loaders.is_empty() {
                self.builtins.insert(BUNDLE_LOADER.to_string());
                let mut body = format!("var b = require(\"{BUNDLE_LOADER}\");\n");
                for (bundle_type, loader) in &loaders {
                    self.builtins.insert(loader.clone());
                    body.push_str(&format!(
                        "b.register(\"{bundle_type}\", require(\"{loader}\"));\n"
                    ));
                }
                loader_registration = Some(body);
                entries.push(ModuleId::LOADER_REGISTRATION);
            }
        } else {
            // resolved through the parent bundle's registry at runtime
            self.builtins.retain(|name| !ROOT_OWNED.contains(&name.as_str()));
        }

        // builtins may require other builtins
        let mut index = 0;
        while let Some(name) = self.builtins.get_index(index).cloned() {
            for dep in builtins::dependencies(&name) {
                self.builtins.insert(dep.to_string());
            }
            index += 1;
        }

        let names: Vec<String> = self.builtins.iter().cloned().collect();
        for name in names {
            let Some(source) = builtins::source(&name) else {
                continue;
            };
            let source = substitute(source, cx.options);
            self.write_module(out, &ModuleId::Builtin(name), &source, "{}")
                .await?;
        }

        if let Some(body) = loader_registration {
            self.write_module(out, &ModuleId::LOADER_REGISTRATION, &body, "{}")
                .await?;
        }

        if let Some(entry) = cx.bundle.entry_asset {
            if cx.bundle.assets.contains(&entry) {
                entries.extend(cx.ids.get(entry));
            }
        }

        let entries = serde_json::to_string(&entries).map_err(|e| out.error(e))?;
        out.write_str(&format!("}},{{}},{entries})\n")).await
    }
}

fn id_value(id: &ModuleId) -> Value {
    match id {
        ModuleId::Asset(n) => Value::from(*n),
        ModuleId::Builtin(name) => Value::String(name.clone()),
    }
}

/// The bundle created for `entry` by a dynamic import, nearest to `from` first.
fn entry_bundle(tree: &BundleTree, from: Option<BundleId>, entry: NodeIdx) -> Option<BundleId> {
    from.and_then(|bundle| tree.child_for(bundle, entry)).or_else(|| {
        tree.bundles()
            .find(|b| b.parent.is_some() && Some(b.id) != from && b.entry_asset == Some(entry))
            .map(|b| b.id)
    })
}

/// File names to load for a deferred bundle: the bundle itself, then its non-empty siblings.
fn bundle_names(tree: &BundleTree, bundle: BundleId) -> Vec<String> {
    let bundle = tree.bundle(bundle);
    let mut names = vec![bundle.name.clone()];
    for &sibling in bundle.siblings.values() {
        let sibling = tree.bundle(sibling);
        if !sibling.is_empty() {
            names.push(sibling.name.clone());
        }
    }
    names
}

/// No script bundle above this one in the tree.
fn is_script_root(cx: &PackageContext<'_>) -> bool {
    cx.tree
        .ancestors(cx.bundle.id)
        .skip(1)
        .all(|id| cx.tree.bundle(id).bundle_type != AssetType::Js)
}

/// Loader module per bundle type that a deferred bundle below this one needs.
fn loader_modules(cx: &PackageContext<'_>) -> Vec<(String, String)> {
    let mut types = IndexSet::new();
    let mut stack: Vec<BundleId> = cx.bundle.children.iter().copied().collect();

    while let Some(id) = stack.pop() {
        let bundle = cx.tree.bundle(id);
        if bundle.entry_asset.is_some() && !bundle.is_empty() {
            types.insert(bundle.bundle_type.as_str().to_string());
            for &sibling in bundle.siblings.values() {
                if !cx.tree.bundle(sibling).is_empty() {
                    types.insert(cx.tree.bundle(sibling).bundle_type.as_str().to_string());
                }
            }
        }
        stack.extend(bundle.children.iter().copied());
    }

    let mut loaders: Vec<(String, String)> = types
        .into_iter()
        .filter_map(|t| {
            let loader = cx.options.bundle_loaders.get(&t)?.clone();
            Some((t, loader))
        })
        .collect();
    loaders.sort();
    loaders
}

fn substitute(source: &str, options: &BundlerOptions) -> String {
    source
        .replace(PUBLIC_URL_PLACEHOLDER, &options.public_url)
        .replace(HMR_URL_PLACEHOLDER, &hmr_url(options))
}

/// Endpoint the browser runtime connects to. Same origin unless a host or port is set.
pub(crate) fn hmr_url(options: &BundlerOptions) -> String {
    match (&options.hmr_hostname, options.hmr_port) {
        (None, None) => options.hmr_path.clone(),
        (host, port) => {
            let host = host.as_deref().unwrap_or("localhost");
            match port {
                Some(port) => format!("http://{host}:{port}{}", options.hmr_path),
                None => format!("http://{host}{}", options.hmr_path),
            }
        }
    }
}

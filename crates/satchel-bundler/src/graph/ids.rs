use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::NodeIdx;

/// Identifier of a module inside packaged script bundles.
///
/// Assets get numeric ids; builtin runtime modules keep their string name.
/// Serializes to a bare JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    Asset(u32),
    Builtin(String),
}

impl ModuleId {
    /// Id of the module that registers bundle loaders in a root bundle.
    pub const LOADER_REGISTRATION: ModuleId = ModuleId::Asset(0);

    /// JSON literal of this id, suitable for embedding in script output.
    pub fn to_js(&self) -> String {
        match self {
            ModuleId::Asset(id) => id.to_string(),
            ModuleId::Builtin(name) => {
                serde_json::to_string(name).unwrap_or_else(|_| format!("\"{name}\""))
            }
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleId::Asset(id) => write!(f, "{id}"),
            ModuleId::Builtin(name) => f.write_str(name),
        }
    }
}

/// Session-lifetime assignment of module ids to graph nodes.
///
/// Ids start at 1 and never change once given out, so live updates patch the
/// same module the page already knows.
#[derive(Debug, Clone, Default)]
pub struct ModuleIds {
    ids: FxHashMap<NodeIdx, u32>,
    next: u32,
}

impl ModuleIds {
    pub fn new() -> Self {
        Self {
            ids: FxHashMap::default(),
            next: 1,
        }
    }

    /// Id of `node`, assigning the next free one on first use.
    pub fn assign(&mut self, node: NodeIdx) -> ModuleId {
        if self.next == 0 {
            self.next = 1;
        }
        let next = &mut self.next;
        let id = *self.ids.entry(node).or_insert_with(|| {
            let id = *next;
            *next += 1;
            id
        });
        ModuleId::Asset(id)
    }

    pub fn get(&self, node: NodeIdx) -> Option<ModuleId> {
        self.ids.get(&node).map(|&id| ModuleId::Asset(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::graph::AssetGraph;

    #[test]
    fn ids_are_stable_and_start_at_one() {
        let mut graph = AssetGraph::new();
        let a = graph.register(Path::new("/a.js"), None).idx();
        let b = graph.register(Path::new("/b.js"), None).idx();

        let mut ids = ModuleIds::default();
        assert_eq!(ids.assign(b), ModuleId::Asset(1));
        assert_eq!(ids.assign(a), ModuleId::Asset(2));
        assert_eq!(ids.assign(b), ModuleId::Asset(1));
        assert_eq!(ids.get(a), Some(ModuleId::Asset(2)));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn ids_serialize_as_bare_values() {
        assert_eq!(serde_json::to_string(&ModuleId::Asset(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&ModuleId::Builtin("satchel/css-reload".into())).unwrap(),
            "\"satchel/css-reload\""
        );
        assert_eq!(ModuleId::Builtin("x".into()).to_js(), "\"x\"");
        assert_eq!(ModuleId::LOADER_REGISTRATION.to_js(), "0");
    }
}

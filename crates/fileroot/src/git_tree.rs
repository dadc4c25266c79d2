use std::collections::BTreeMap;
use std::sync::Arc;

use bb_model::ObjectType;

/// An already-resolved Git tree: ordered (by name) entries, each naming
/// their kind and the hex id of the object they point to. Subtrees are
/// resolved lazily through a [`GitObjectStore`] rather than eagerly
/// recursed into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitTree {
    entries: BTreeMap<String, (ObjectType, String)>,
}

impl GitTree {
    pub fn new(entries: BTreeMap<String, (ObjectType, String)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<(ObjectType, &str)> {
        self.entries.get(name).map(|(t, id)| (*t, id.as_str()))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, ObjectType)> {
        self.entries.iter().map(|(name, (t, _))| (name.as_str(), *t))
    }
}

/// Backing object database for a Git-rooted [`crate::FileRoot`] (§3 "Git
/// root (opened object database + tree object)").
pub trait GitObjectStore: Send + Sync {
    fn read_blob(&self, hex_id: &str) -> Option<Vec<u8>>;
    fn read_tree(&self, hex_id: &str) -> Option<GitTree>;
}

pub type GitObjectStoreRef = Arc<dyn GitObjectStore>;

/// Walks `path` (`/`-separated, relative) from `root` through `store`,
/// returning the final entry's type and object id. `.` resolves to the
/// root tree itself.
pub fn lookup_entry_by_path<'a>(
    store: &dyn GitObjectStore,
    root: &'a GitTree,
    path: &str,
) -> Option<(ObjectType, String)> {
    if path == "." || path.is_empty() {
        return None;
    }
    let mut current = root.clone();
    let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty() && *c != ".").collect();
    let last = components.pop()?;
    for component in components {
        let (kind, id) = current.get(component)?;
        if kind != ObjectType::Tree {
            return None;
        }
        current = store.read_tree(id)?;
    }
    let (kind, id) = current.get(last)?;
    Some((kind, id.to_string()))
}

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bb_model::ObjectType;

use crate::entries::DirectoryEntries;
use crate::git_tree::{lookup_entry_by_path, GitObjectStoreRef, GitTree};

/// Tagged variant over a filesystem directory, an opened Git tree, or a
/// root known only by its declared tree id with no content available
/// locally (§3 "File Root").
#[derive(Clone)]
pub enum FileRoot {
    Fs(PathBuf),
    Git { store: GitObjectStoreRef, tree: GitTree },
    Absent { tree_id: String },
}

impl FileRoot {
    pub fn from_directory(root: impl Into<PathBuf>) -> Self {
        FileRoot::Fs(root.into())
    }

    pub fn from_git(store: GitObjectStoreRef, tree: GitTree) -> Self {
        FileRoot::Git { store, tree }
    }

    pub fn absent(tree_id: impl Into<String>) -> Self {
        FileRoot::Absent {
            tree_id: tree_id.into(),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FileRoot::Absent { .. })
    }

    pub fn get_absent_tree_id(&self) -> Option<&str> {
        match self {
            FileRoot::Absent { tree_id } => Some(tree_id.as_str()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        match self {
            FileRoot::Fs(root) => root.join(path).exists(),
            FileRoot::Git { store, tree } => {
                let p = path.to_string_lossy();
                p == "." || lookup_entry_by_path(store.as_ref(), tree, &p).is_some()
            }
            FileRoot::Absent { .. } => false,
        }
    }

    pub fn is_file(&self, path: &Path) -> bool {
        match self {
            FileRoot::Fs(root) => fs::metadata(root.join(path)).map(|m| m.is_file()).unwrap_or(false),
            FileRoot::Git { store, tree } => {
                let p = path.to_string_lossy();
                matches!(
                    lookup_entry_by_path(store.as_ref(), tree, &p),
                    Some((ObjectType::File | ObjectType::Executable, _))
                )
            }
            FileRoot::Absent { .. } => false,
        }
    }

    pub fn is_directory(&self, path: &Path) -> bool {
        match self {
            FileRoot::Fs(root) => fs::metadata(root.join(path)).map(|m| m.is_dir()).unwrap_or(false),
            FileRoot::Git { store, tree } => {
                let p = path.to_string_lossy();
                if p == "." {
                    return true;
                }
                matches!(lookup_entry_by_path(store.as_ref(), tree, &p), Some((ObjectType::Tree, _)))
            }
            FileRoot::Absent { .. } => false,
        }
    }

    pub fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        match self {
            FileRoot::Fs(root) => fs::read(root.join(path)).ok(),
            FileRoot::Git { store, tree } => {
                let p = path.to_string_lossy();
                let (kind, id) = lookup_entry_by_path(store.as_ref(), tree, &p)?;
                if !matches!(kind, ObjectType::File | ObjectType::Executable | ObjectType::Symlink) {
                    return None;
                }
                store.read_blob(&id)
            }
            FileRoot::Absent { .. } => None,
        }
    }

    pub fn read_directory(&self, path: &Path) -> DirectoryEntries {
        match self {
            FileRoot::Fs(root) => {
                let full = root.join(path);
                let Ok(read_dir) = fs::read_dir(&full) else {
                    return DirectoryEntries::empty();
                };
                let mut map = BTreeMap::new();
                for entry in read_dir.flatten() {
                    let Ok(file_type) = entry.file_type() else { continue };
                    let object_type = if file_type.is_dir() {
                        ObjectType::Tree
                    } else if file_type.is_symlink() {
                        ObjectType::Symlink
                    } else if is_executable(&entry.path()) {
                        ObjectType::Executable
                    } else {
                        ObjectType::File
                    };
                    map.insert(entry.file_name().to_string_lossy().into_owned(), object_type);
                }
                DirectoryEntries::new(map)
            }
            FileRoot::Git { store, tree } => {
                let p = path.to_string_lossy();
                let subtree = if p == "." {
                    Some(tree.clone())
                } else {
                    match lookup_entry_by_path(store.as_ref(), tree, &p) {
                        Some((ObjectType::Tree, id)) => store.read_tree(&id),
                        _ => None,
                    }
                };
                let Some(subtree) = subtree else {
                    tracing::warn!(path = %p, "reading directory failed: not a tree");
                    return DirectoryEntries::empty();
                };
                let map = subtree.entries().map(|(name, t)| (name.to_string(), t)).collect();
                DirectoryEntries::new(map)
            }
            FileRoot::Absent { .. } => DirectoryEntries::empty(),
        }
    }

    pub fn file_type(&self, path: &Path) -> Option<ObjectType> {
        match self {
            FileRoot::Fs(root) => {
                let full = root.join(path);
                let meta = fs::symlink_metadata(&full).ok()?;
                if meta.file_type().is_symlink() {
                    Some(ObjectType::Symlink)
                } else if meta.is_file() {
                    Some(if is_executable(&full) {
                        ObjectType::Executable
                    } else {
                        ObjectType::File
                    })
                } else {
                    None
                }
            }
            FileRoot::Git { store, tree } => {
                let p = path.to_string_lossy();
                match lookup_entry_by_path(store.as_ref(), tree, &p)? {
                    (ObjectType::Tree, _) => None,
                    (other, _) => Some(other),
                }
            }
            FileRoot::Absent { .. } => None,
        }
    }

    pub fn read_blob(&self, hex_id: &str) -> Option<Vec<u8>> {
        match self {
            FileRoot::Git { store, .. } => store.read_blob(hex_id),
            _ => None,
        }
    }

    pub fn read_tree(&self, hex_id: &str) -> Option<GitTree> {
        match self {
            FileRoot::Git { store, .. } => store.read_tree(hex_id),
            _ => None,
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct FakeStore {
        blobs: Mutex<BTreeMap<String, Vec<u8>>>,
        trees: Mutex<BTreeMap<String, GitTree>>,
    }

    impl crate::git_tree::GitObjectStore for FakeStore {
        fn read_blob(&self, hex_id: &str) -> Option<Vec<u8>> {
            self.blobs.lock().unwrap().get(hex_id).cloned()
        }
        fn read_tree(&self, hex_id: &str) -> Option<GitTree> {
            self.trees.lock().unwrap().get(hex_id).cloned()
        }
    }

    #[test]
    fn fs_root_reads_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let root = FileRoot::from_directory(dir.path());

        assert!(root.is_file(Path::new("a.txt")));
        assert!(root.is_directory(Path::new("sub")));
        assert_eq!(root.read_file(Path::new("a.txt")), Some(b"hello".to_vec()));

        let entries = root.read_directory(Path::new("."));
        assert!(entries.contains_file("a.txt"));
        assert!(entries.directories().any(|d| d == "sub"));
    }

    #[test]
    fn git_root_resolves_nested_paths() {
        let mut sub_entries = BTreeMap::new();
        sub_entries.insert("inner.txt".to_string(), (ObjectType::File, "bbbb".to_string()));
        let sub_tree = GitTree::new(sub_entries);

        let mut root_entries = BTreeMap::new();
        root_entries.insert("sub".to_string(), (ObjectType::Tree, "aaaa".to_string()));
        let root_tree = GitTree::new(root_entries);

        let mut trees = BTreeMap::new();
        trees.insert("aaaa".to_string(), sub_tree);
        let mut blobs = BTreeMap::new();
        blobs.insert("bbbb".to_string(), b"content".to_vec());

        let store: GitObjectStoreRef = std::sync::Arc::new(FakeStore {
            blobs: Mutex::new(blobs),
            trees: Mutex::new(trees),
        });
        let root = FileRoot::from_git(store, root_tree);

        assert!(root.is_directory(Path::new("sub")));
        assert!(root.is_file(Path::new("sub/inner.txt")));
        assert_eq!(root.read_file(Path::new("sub/inner.txt")), Some(b"content".to_vec()));
    }

    #[test]
    fn absent_root_reports_its_tree_id_and_has_no_content() {
        let root = FileRoot::absent("deadbeef");
        assert!(root.is_absent());
        assert_eq!(root.get_absent_tree_id(), Some("deadbeef"));
        assert!(!root.exists(Path::new("anything")));
        assert_eq!(root.read_file(Path::new("anything")), None);
    }
}

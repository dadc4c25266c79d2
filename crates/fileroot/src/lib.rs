//! `FileRoot`: a uniform view over a filesystem directory, an opened Git
//! tree, or an absent root known only by its declared tree id (C5).

mod entries;
mod git_tree;
mod root;

pub use entries::DirectoryEntries;
pub use git_tree::{lookup_entry_by_path, GitObjectStore, GitObjectStoreRef, GitTree};
pub use root::FileRoot;

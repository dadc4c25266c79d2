//! Generational local content-addressed storage, uplinking, garbage
//! collection, and the tree-structure cache (C6, C11).

mod config;
mod error;
mod local_cas;
mod tree_cache;
mod tree_format;

pub use config::{CasKind, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use local_cas::LocalCas;
pub use tree_cache::{compute_tree_shape, TreeStructureCache};
pub use tree_format::{decode as decode_tree_entries, encode as encode_tree_entries, TreeEntry};

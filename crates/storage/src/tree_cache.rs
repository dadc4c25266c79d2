use std::fs;
use std::sync::Arc;

use bb_hash::ArtifactDigest;
use bb_model::ObjectType;

use crate::config::CasKind;
use crate::error::{StorageError, StorageResult};
use crate::local_cas::LocalCas;
use crate::tree_format::TreeEntry;

/// Produces the shape-only projection of a tree (§4.10): every leaf blob's
/// digest is replaced by the digest of the empty blob (preserving whether
/// it was a plain file or executable); symlinks are preserved by target;
/// subtrees recurse. The projected tree is written into `cas` so it can be
/// coupled into the cache afterwards.
pub fn compute_tree_shape(cas: &LocalCas, tree_digest: &ArtifactDigest) -> StorageResult<ArtifactDigest> {
    let entries = cas.read_tree_entries(tree_digest)?;
    let mut projected = Vec::with_capacity(entries.len());
    for entry in entries {
        let digest = match entry.object_type {
            ObjectType::File | ObjectType::Executable => cas.store_bytes(CasKind::File, b"")?,
            ObjectType::Symlink => entry.digest,
            ObjectType::Tree => compute_tree_shape(cas, &entry.digest)?,
        };
        projected.push(TreeEntry {
            name: entry.name,
            object_type: entry.object_type,
            digest,
        });
    }
    cas.store_tree_entries(&projected)
}

/// Key/value coupling cache from a tree digest to the digest of its shape
/// projection (§4.10). Both key and value are GitSHA1 tree digests.
pub struct TreeStructureCache {
    cas: Arc<LocalCas>,
}

impl TreeStructureCache {
    pub fn new(cas: Arc<LocalCas>) -> Self {
        Self { cas }
    }

    fn mapping_path(&self, key: &ArtifactDigest) -> std::path::PathBuf {
        let hash = key.hash();
        let (prefix, rest) = hash.split_at(2.min(hash.len()));
        self.cas.config().tree_structure_dir().join(prefix).join(rest)
    }

    /// Couples `key` to `value`. Both must already be present in the CAS as
    /// tree objects. Returns `false` without changing anything if `key` is
    /// already coupled to a different value.
    pub fn set(&self, key: &ArtifactDigest, value: &ArtifactDigest) -> StorageResult<bool> {
        self.cas
            .path_if_present(CasKind::Tree, key)
            .map_err(|_| StorageError::MissingCoupledObject(key.hash().to_string()))?;
        self.cas
            .path_if_present(CasKind::Tree, value)
            .map_err(|_| StorageError::MissingCoupledObject(value.hash().to_string()))?;

        let path = self.mapping_path(key);
        if let Ok(existing) = fs::read_to_string(&path) {
            let existing_hash = existing.split(',').next().unwrap_or("");
            return Ok(existing_hash == value.hash());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{},{}", value.hash(), value.size()))?;
        Ok(true)
    }

    /// Reads back the value coupled to `key`, uplinking both across
    /// generations.
    pub fn get(&self, key: &ArtifactDigest) -> StorageResult<Option<ArtifactDigest>> {
        let path = self.mapping_path(key);
        let Ok(content) = fs::read_to_string(&path) else {
            return Ok(None);
        };
        let (hash, size) = content
            .split_once(',')
            .ok_or_else(|| StorageError::NotFound(key.hash().to_string()))?;
        let size: u64 = size
            .parse()
            .map_err(|_| StorageError::NotFound(key.hash().to_string()))?;
        let value = ArtifactDigest::from_hex(self.cas.config().hash_family(), hash.to_string(), size, true)
            .map_err(|_| StorageError::NotFound(key.hash().to_string()))?;

        let _ = self.cas.path_if_present(CasKind::Tree, key)?;
        let _ = self.cas.path_if_present(CasKind::Tree, &value)?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use bb_hash::HashFamily;

    fn cache_with_cas(generations: usize) -> (tempfile::TempDir, Arc<LocalCas>, TreeStructureCache) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path(), HashFamily::GitSha1, generations);
        let cas = Arc::new(LocalCas::open(config).unwrap());
        let cache = TreeStructureCache::new(Arc::clone(&cas));
        (dir, cas, cache)
    }

    fn single_file_tree(cas: &LocalCas, name: &str, content: &[u8]) -> ArtifactDigest {
        let blob = cas.store_bytes(CasKind::File, content).unwrap();
        cas.store_tree_entries(&[TreeEntry {
            name: name.into(),
            object_type: ObjectType::File,
            digest: blob,
        }])
        .unwrap()
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, cas, cache) = cache_with_cas(1);
        let key = single_file_tree(&cas, "a.txt", b"hello");
        let value = compute_tree_shape(&cas, &key).unwrap();

        assert!(cache.set(&key, &value).unwrap());
        assert_eq!(cache.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn conflicting_set_is_rejected_and_original_value_survives() {
        let (_dir, cas, cache) = cache_with_cas(1);
        let key = single_file_tree(&cas, "a.txt", b"hello");
        let value = compute_tree_shape(&cas, &key).unwrap();
        let other = single_file_tree(&cas, "b.txt", b"other");

        assert!(cache.set(&key, &value).unwrap());
        assert!(!cache.set(&key, &other).unwrap());
        assert_eq!(cache.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn shape_projection_collapses_leaf_content() {
        let (_dir, cas, _cache) = cache_with_cas(1);
        let key_a = single_file_tree(&cas, "a.txt", b"hello");
        let key_b = single_file_tree(&cas, "a.txt", b"totally different content");

        let shape_a = compute_tree_shape(&cas, &key_a).unwrap();
        let shape_b = compute_tree_shape(&cas, &key_b).unwrap();
        assert_eq!(shape_a, shape_b);
    }
}

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use bb_hash::ArtifactDigest;
use parking_lot::RwLock;

use crate::config::{CasKind, StorageConfig};
use crate::error::{StorageError, StorageResult};
use crate::tree_format::{self, TreeEntry};

/// Generational local CAS (§4.8). Reads probe generation 0 first, then
/// older generations in order; a hit in generation k>0 uplinks the object
/// (and, for trees, its full referenced closure) into generation 0.
/// `trigger_garbage_collection` rotates the oldest generation out and
/// opens a fresh generation 0 in its place. Long-running reads hold the
/// shared lock; GC takes the exclusive lock (§5).
pub struct LocalCas {
    config: StorageConfig,
    zero_index: AtomicUsize,
    lock: RwLock<()>,
}

impl LocalCas {
    pub fn open(config: StorageConfig) -> std::io::Result<Self> {
        for physical in 0..config.generations() {
            for kind in [CasKind::File, CasKind::Executable, CasKind::Tree] {
                let dir = config.generation_dir(physical).join(match kind {
                    CasKind::File => "cas_f",
                    CasKind::Executable => "cas_x",
                    CasKind::Tree => "cas_t",
                });
                fs::create_dir_all(dir)?;
            }
        }
        fs::create_dir_all(config.tree_structure_dir())?;
        fs::create_dir_all(config.git_odb_dir())?;
        Ok(Self {
            config,
            zero_index: AtomicUsize::new(0),
            lock: RwLock::new(()),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn physical_of(&self, logical_generation: usize) -> usize {
        let zero = self.zero_index.load(Ordering::SeqCst);
        (zero + logical_generation) % self.config.generations()
    }

    /// Hashes `content` (applying git blob/tree framing per the configured
    /// hash family) and writes it into generation 0, creating parent
    /// directories as needed. A no-op if the object is already present.
    pub fn store_bytes(&self, kind: CasKind, content: &[u8]) -> StorageResult<ArtifactDigest> {
        let _guard = self.lock.read();
        let is_tree = matches!(kind, CasKind::Tree);
        let digest = ArtifactDigest::hash_data_as(self.config.hash_family(), content, is_tree);
        let path = self.config.object_path(self.physical_of(0), kind, digest.hash());
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
        }
        Ok(digest)
    }

    /// Stores an existing file's content, hard-linking it into the CAS when
    /// possible and falling back to a copy across filesystems.
    pub fn store_file(&self, kind: CasKind, source: &std::path::Path) -> StorageResult<ArtifactDigest> {
        let content = fs::read(source)?;
        let digest = self.store_bytes(kind, &content)?;
        Ok(digest)
    }

    pub fn store_tree_entries(&self, entries: &[TreeEntry]) -> StorageResult<ArtifactDigest> {
        self.store_bytes(CasKind::Tree, &tree_format::encode(entries))
    }

    pub fn read_tree_entries(&self, digest: &ArtifactDigest) -> StorageResult<Vec<TreeEntry>> {
        let bytes = self.read_bytes(CasKind::Tree, digest)?;
        tree_format::decode(&bytes, self.config.hash_family())
            .ok_or_else(|| StorageError::NotFound(digest.hash().to_string()))
    }

    /// Returns the generation-0 path for `digest`, uplinking it (and, for
    /// trees, its full referenced closure) from an older generation on hit.
    pub fn path_if_present(&self, kind: CasKind, digest: &ArtifactDigest) -> StorageResult<PathBuf> {
        let _guard = self.lock.read();
        self.locate_and_uplink(kind, digest)
    }

    pub fn read_bytes(&self, kind: CasKind, digest: &ArtifactDigest) -> StorageResult<Vec<u8>> {
        let path = self.path_if_present(kind, digest)?;
        Ok(fs::read(path)?)
    }

    fn locate_and_uplink(&self, kind: CasKind, digest: &ArtifactDigest) -> StorageResult<PathBuf> {
        let gen0_path = self.config.object_path(self.physical_of(0), kind, digest.hash());
        if gen0_path.exists() {
            return Ok(gen0_path);
        }
        for logical in 1..self.config.generations() {
            let physical = self.physical_of(logical);
            let path = self.config.object_path(physical, kind, digest.hash());
            if path.exists() {
                self.uplink_object(kind, digest, &path)?;
                self.uplink_closure_of(kind, digest)?;
                return Ok(gen0_path);
            }
        }
        Err(StorageError::NotFound(digest.hash().to_string()))
    }

    fn uplink_object(&self, kind: CasKind, digest: &ArtifactDigest, from: &std::path::Path) -> StorageResult<()> {
        let target = self.config.object_path(self.physical_of(0), kind, digest.hash());
        if target.exists() {
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::hard_link(from, &target).is_err() {
            fs::copy(from, &target)?;
        }
        Ok(())
    }

    /// For a tree object just uplinked to generation 0, recursively uplinks
    /// every blob/tree it references.
    fn uplink_closure_of(&self, kind: CasKind, digest: &ArtifactDigest) -> StorageResult<()> {
        if !matches!(kind, CasKind::Tree) {
            return Ok(());
        }
        let bytes = fs::read(self.config.object_path(self.physical_of(0), kind, digest.hash()))?;
        let Some(entries) = tree_format::decode(&bytes, self.config.hash_family()) else {
            return Ok(());
        };
        for entry in entries {
            use bb_model::ObjectType;
            let child_kind = match entry.object_type {
                ObjectType::Tree => CasKind::Tree,
                ObjectType::Executable => CasKind::Executable,
                ObjectType::File | ObjectType::Symlink => CasKind::File,
            };
            // locate_and_uplink is idempotent and recurses for nested trees.
            let _ = self.locate_and_uplink(child_kind, &entry.digest);
        }
        Ok(())
    }

    /// Rotates generations: deletes the oldest, and makes its (now-empty)
    /// directory the new generation 0. Takes the exclusive lock.
    pub fn trigger_garbage_collection(&self) -> StorageResult<()> {
        let _guard = self.lock.write();
        let oldest_logical = self.config.generations() - 1;
        let oldest_physical = self.physical_of(oldest_logical);
        for kind in [CasKind::File, CasKind::Executable, CasKind::Tree] {
            let dir = self.config.generation_dir(oldest_physical).join(match kind {
                CasKind::File => "cas_f",
                CasKind::Executable => "cas_x",
                CasKind::Tree => "cas_t",
            });
            fs::remove_dir_all(&dir)?;
            fs::create_dir_all(&dir)?;
        }
        self.zero_index.store(oldest_physical, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_hash::HashFamily;

    fn cas_with_generations(generations: usize) -> (tempfile::TempDir, LocalCas) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path(), HashFamily::GitSha1, generations);
        let cas = LocalCas::open(config).unwrap();
        (dir, cas)
    }

    #[test]
    fn stores_and_reads_back_bytes() {
        let (_dir, cas) = cas_with_generations(1);
        let digest = cas.store_bytes(CasKind::File, b"hello world").unwrap();
        let read_back = cas.read_bytes(CasKind::File, &digest).unwrap();
        assert_eq!(read_back, b"hello world");
    }

    #[test]
    fn gc_preserves_objects_and_uplinks_on_access() {
        let (_dir, cas) = cas_with_generations(2);
        let digest = cas.store_bytes(CasKind::File, b"survivor").unwrap();

        // Rotate once: the object moves from logical gen 0 to gen 1.
        cas.trigger_garbage_collection().unwrap();
        let path = cas.path_if_present(CasKind::File, &digest).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap(), b"survivor");

        // The access above must have uplinked it back into generation 0.
        let gen0_path = cas.config().object_path(cas.physical_of(0), CasKind::File, digest.hash());
        assert!(gen0_path.exists());
    }

    #[test]
    fn gc_drops_objects_only_reachable_from_the_oldest_generation() {
        let (_dir, cas) = cas_with_generations(2);
        let digest = cas.store_bytes(CasKind::File, b"doomed").unwrap();
        cas.trigger_garbage_collection().unwrap();
        cas.trigger_garbage_collection().unwrap();
        assert!(cas.path_if_present(CasKind::File, &digest).is_err());
    }

    #[test]
    fn tree_uplink_closure_carries_referenced_blobs() {
        let (_dir, cas) = cas_with_generations(2);
        let blob_digest = cas.store_bytes(CasKind::File, b"leaf").unwrap();
        let entries = vec![TreeEntry {
            name: "leaf.txt".into(),
            object_type: bb_model::ObjectType::File,
            digest: blob_digest.clone(),
        }];
        let tree_digest = cas.store_tree_entries(&entries).unwrap();

        cas.trigger_garbage_collection().unwrap();
        // Touching the tree must pull both it and the leaf blob forward.
        let _ = cas.path_if_present(CasKind::Tree, &tree_digest).unwrap();
        let blob_gen0 = cas.config().object_path(cas.physical_of(0), CasKind::File, blob_digest.hash());
        assert!(blob_gen0.exists());
    }
}

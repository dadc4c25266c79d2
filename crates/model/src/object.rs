use bb_hash::ArtifactDigest;

/// §3 "Artifact / Object Info". Symlinks carry their target text as the
/// hashed content, so a `Symlink` digest is over the link text, not a
/// dereferenced file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    File,
    Executable,
    Symlink,
    Tree,
}

impl ObjectType {
    pub fn is_tree(self) -> bool {
        matches!(self, ObjectType::Tree)
    }
}

/// (digest, object-type, failed-flag). `failed=true` models an artifact whose
/// producing action failed but that must still exist in the graph so
/// downstream analysis can continue (§7 `may_fail`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    digest: ArtifactDigest,
    object_type: ObjectType,
    failed: bool,
}

impl ObjectInfo {
    pub fn new(digest: ArtifactDigest, object_type: ObjectType) -> Self {
        Self {
            digest,
            object_type,
            failed: false,
        }
    }

    pub fn with_failed(digest: ArtifactDigest, object_type: ObjectType, failed: bool) -> Self {
        Self {
            digest,
            object_type,
            failed,
        }
    }

    pub fn digest(&self) -> &ArtifactDigest {
        &self.digest
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn failed(&self) -> bool {
        self.failed
    }
}

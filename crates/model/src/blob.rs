use std::path::PathBuf;

use bb_hash::ArtifactDigest;

/// Where an [`ArtifactBlob`]'s bytes actually live.
#[derive(Debug, Clone)]
pub enum ContentSource {
    Owned(String),
    Path(PathBuf),
}

/// (digest, content-source, is_executable); §3 "Artifact Blob". Equality is
/// over `(digest, is_executable)` — the content source is just a way to get
/// at the bytes, not part of identity.
#[derive(Debug, Clone)]
pub struct ArtifactBlob {
    digest: ArtifactDigest,
    source: ContentSource,
    is_executable: bool,
}

impl ArtifactBlob {
    pub fn new(digest: ArtifactDigest, source: ContentSource, is_executable: bool) -> Self {
        Self {
            digest,
            source,
            is_executable,
        }
    }

    pub fn digest(&self) -> &ArtifactDigest {
        &self.digest
    }

    pub fn source(&self) -> &ContentSource {
        &self.source
    }

    pub fn is_executable(&self) -> bool {
        self.is_executable
    }
}

impl PartialEq for ArtifactBlob {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest && self.is_executable == other.is_executable
    }
}
impl Eq for ArtifactBlob {}

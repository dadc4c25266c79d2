//! Typed content hashes: [`HashFamily`], [`HashInfo`], and [`ArtifactDigest`]
//! (C3). Two hash families are supported, matching §3/§6.3:
//!
//! - `GitSha1`: a Git-style SHA-1 with Git blob/tree framing, the only family
//!   under which `is_tree` may be `true`.
//! - `PlainSha256`: a plain SHA-256 with no framing; tree objects are not
//!   permitted.

use std::fmt;

use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("hex hash has length {actual} but {family:?} requires {expected}")]
    WrongLength {
        family: HashFamily,
        expected: usize,
        actual: usize,
    },
    #[error("hash string contains a non-hex-digit character: {0:?}")]
    NotHex(String),
    #[error("is_tree=true is only legal under the GitSha1 family")]
    TreeUnderPlainSha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFamily {
    GitSha1,
    PlainSha256,
}

impl HashFamily {
    pub fn hex_len(self) -> usize {
        match self {
            HashFamily::GitSha1 => 40,
            HashFamily::PlainSha256 => 64,
        }
    }

    pub fn allows_trees(self) -> bool {
        matches!(self, HashFamily::GitSha1)
    }
}

impl fmt::Display for HashFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashFamily::GitSha1 => write!(f, "git-sha1"),
            HashFamily::PlainSha256 => write!(f, "plain-sha256"),
        }
    }
}

/// Triple (hex-hash, hash-family, is-tree); see §3 "Hash Info".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashInfo {
    hash: String,
    family: HashFamily,
    is_tree: bool,
}

impl HashInfo {
    /// Validating constructor for untrusted input (e.g. digests arriving
    /// over the wire or parsed from JSON).
    pub fn create(family: HashFamily, hash: String, is_tree: bool) -> Result<Self, HashError> {
        validate(family, &hash, is_tree)?;
        Ok(Self {
            hash: hash.to_ascii_lowercase(),
            family,
            is_tree,
        })
    }

    /// Infallible: hashes `content` with the family's own algorithm and Git
    /// framing (if `GitSha1` and `is_tree`/blob framing applies).
    pub fn hash_data(family: HashFamily, content: &[u8], is_tree: bool) -> Self {
        let is_tree = is_tree && family.allows_trees();
        let hash = match family {
            HashFamily::GitSha1 => {
                let kind = if is_tree { "tree" } else { "blob" };
                let mut hasher = Sha1::new();
                hasher.update(kind.as_bytes());
                hasher.update(b" ");
                hasher.update(content.len().to_string().as_bytes());
                hasher.update(b"\0");
                hasher.update(content);
                hex::encode(hasher.finalize())
            }
            HashFamily::PlainSha256 => {
                let mut hasher = Sha256::new();
                hasher.update(content);
                hex::encode(hasher.finalize())
            }
        };
        Self {
            hash,
            family,
            is_tree,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn family(&self) -> HashFamily {
        self.family
    }

    pub fn is_tree(&self) -> bool {
        self.is_tree
    }
}

fn validate(family: HashFamily, hash: &str, is_tree: bool) -> Result<(), HashError> {
    if is_tree && !family.allows_trees() {
        return Err(HashError::TreeUnderPlainSha256);
    }
    let expected = family.hex_len();
    if hash.len() != expected {
        return Err(HashError::WrongLength {
            family,
            expected,
            actual: hash.len(),
        });
    }
    if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HashError::NotHex(hash.to_string()));
    }
    Ok(())
}

/// Pair (hash-info, size); §3 "Artifact Digest". Size is the unframed
/// content byte length. Equality/hashing are over `hash_info` only.
#[derive(Debug, Clone)]
pub struct ArtifactDigest {
    hash_info: HashInfo,
    size: u64,
}

impl ArtifactDigest {
    pub fn new(hash_info: HashInfo, size: u64) -> Self {
        Self { hash_info, size }
    }

    pub fn from_hex(family: HashFamily, hash: String, size: u64, is_tree: bool) -> Result<Self, HashError> {
        Ok(Self::new(HashInfo::create(family, hash, is_tree)?, size))
    }

    /// Hashes `content` as a file or a tree, depending on `is_tree`.
    pub fn hash_data_as(family: HashFamily, content: &[u8], is_tree: bool) -> Self {
        let hash_info = HashInfo::hash_data(family, content, is_tree);
        Self::new(hash_info, content.len() as u64)
    }

    pub fn hash(&self) -> &str {
        self.hash_info.hash()
    }

    pub fn family(&self) -> HashFamily {
        self.hash_info.family()
    }

    pub fn is_tree(&self) -> bool {
        self.hash_info.is_tree()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn hash_info(&self) -> &HashInfo {
        &self.hash_info
    }
}

impl PartialEq for ArtifactDigest {
    fn eq(&self, other: &Self) -> bool {
        self.hash_info == other.hash_info
    }
}
impl Eq for ArtifactDigest {}

impl std::hash::Hash for ArtifactDigest {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash_info.hash(state);
    }
}

impl fmt::Display for ArtifactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash(), self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_sha1_blob_framing_matches_git() {
        // `git hash-object` of the empty blob is this well-known constant.
        let digest = ArtifactDigest::hash_data_as(HashFamily::GitSha1, b"", false);
        assert_eq!(digest.hash(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert!(!digest.is_tree());
    }

    #[test]
    fn is_tree_requires_git_family() {
        let err = HashInfo::create(HashFamily::PlainSha256, "a".repeat(64), true).unwrap_err();
        assert_eq!(err, HashError::TreeUnderPlainSha256);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = HashInfo::create(HashFamily::GitSha1, "abc".to_string(), false).unwrap_err();
        assert!(matches!(err, HashError::WrongLength { .. }));
    }

    #[test]
    fn non_hex_is_rejected() {
        let err = HashInfo::create(HashFamily::GitSha1, "z".repeat(40), false).unwrap_err();
        assert!(matches!(err, HashError::NotHex(_)));
    }

    #[test]
    fn digest_equality_ignores_size_mismatch_impossibility() {
        // Equality/hashing is defined over hash_info only (§3).
        let h = HashInfo::create(HashFamily::PlainSha256, "b".repeat(64), false).unwrap();
        let a = ArtifactDigest::new(h.clone(), 10);
        let b = ArtifactDigest::new(h, 20);
        assert_eq!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn is_tree_invariant_holds(content in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64), want_tree in proptest::prelude::any::<bool>()) {
            let digest = ArtifactDigest::hash_data_as(HashFamily::GitSha1, &content, want_tree);
            proptest::prop_assert_eq!(digest.is_tree(), want_tree);
            let digest = ArtifactDigest::hash_data_as(HashFamily::PlainSha256, &content, want_tree);
            proptest::prop_assert!(!digest.is_tree());
        }
    }
}

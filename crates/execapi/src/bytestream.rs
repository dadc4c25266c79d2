//! ByteStream resource-name codec (§6.1). Read and write requests encode to
//! and parse from the bit-exact patterns scenario F in §8 pins down:
//!
//! - Read:  `{instance}/blobs/{hex-hash}/{size}`
//! - Write: `{instance}/uploads/{uuid}/blobs/{hex-hash}/{size}`
//!
//! Components are `/`-joined with no escaping; an unexpected component
//! count or a misplaced `blobs`/`uploads` marker is a parse failure, not a
//! best-effort partial parse.

use bb_hash::{ArtifactDigest, HashFamily};

const BLOBS: &str = "blobs";
const UPLOADS: &str = "uploads";

/// Chunk size for ByteStream uploads (§6.1: 64 KiB default, configurable).
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    instance_name: String,
    hash: String,
    size: u64,
}

impl ReadRequest {
    pub fn new(instance_name: impl Into<String>, digest: &ArtifactDigest) -> Self {
        Self {
            instance_name: instance_name.into(),
            hash: digest.hash().to_string(),
            size: digest.size(),
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn digest(&self, family: HashFamily, is_tree: bool) -> Result<ArtifactDigest, bb_hash::HashError> {
        ArtifactDigest::from_hex(family, self.hash.clone(), self.size, is_tree)
    }

    pub fn to_resource_name(&self) -> String {
        format!("{}/{}/{}/{}", self.instance_name, BLOBS, self.hash, self.size)
    }

    /// Parses a resource name back into its components. Requires exactly 4
    /// `/`-separated parts with `blobs` at index 1; anything else fails.
    pub fn from_resource_name(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() != 4 || parts[1] != BLOBS {
            return None;
        }
        let size: u64 = parts[3].parse().ok()?;
        Some(Self {
            instance_name: parts[0].to_string(),
            hash: parts[2].to_string(),
            size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    instance_name: String,
    uuid: String,
    hash: String,
    size: u64,
}

impl WriteRequest {
    pub fn new(instance_name: impl Into<String>, uuid: impl Into<String>, digest: &ArtifactDigest) -> Self {
        Self {
            instance_name: instance_name.into(),
            uuid: uuid.into(),
            hash: digest.hash().to_string(),
            size: digest.size(),
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn digest(&self, family: HashFamily, is_tree: bool) -> Result<ArtifactDigest, bb_hash::HashError> {
        ArtifactDigest::from_hex(family, self.hash.clone(), self.size, is_tree)
    }

    pub fn to_resource_name(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}",
            self.instance_name, UPLOADS, self.uuid, BLOBS, self.hash, self.size
        )
    }

    /// Requires exactly 6 parts, `uploads` at index 1 and `blobs` at index 3.
    pub fn from_resource_name(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() != 6 || parts[1] != UPLOADS || parts[3] != BLOBS {
            return None;
        }
        let size: u64 = parts[5].parse().ok()?;
        Some(Self {
            instance_name: parts[0].to_string(),
            uuid: parts[2].to_string(),
            hash: parts[4].to_string(),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_hash::HashFamily;

    fn digest() -> ArtifactDigest {
        ArtifactDigest::from_hex(
            HashFamily::GitSha1,
            "62183d7a696acf7e69e218efc82c93135f8c85f8".to_string(),
            4424712,
            false,
        )
        .unwrap()
    }

    /// Scenario F (§8): ByteStream path round-trip.
    #[test]
    fn read_request_round_trips_through_the_bit_exact_pattern() {
        let req = ReadRequest::new("inst", &digest());
        let encoded = req.to_resource_name();
        assert_eq!(encoded, "inst/blobs/62183d7a696acf7e69e218efc82c93135f8c85f8/4424712");
        let parsed = ReadRequest::from_resource_name(&encoded).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn write_request_round_trips_through_the_bit_exact_pattern() {
        let req = WriteRequest::new("inst", "c4f03510-7d56-4490-8934-01bce1b1288e", &digest());
        let encoded = req.to_resource_name();
        assert_eq!(
            encoded,
            "inst/uploads/c4f03510-7d56-4490-8934-01bce1b1288e/blobs/62183d7a696acf7e69e218efc82c93135f8c85f8/4424712"
        );
        let parsed = WriteRequest::from_resource_name(&encoded).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn wrong_component_count_fails_to_parse() {
        assert!(ReadRequest::from_resource_name("inst/blobs/abc").is_none());
        assert!(ReadRequest::from_resource_name("inst/blobs/abc/10/extra").is_none());
        assert!(WriteRequest::from_resource_name("inst/uploads/u/blobs/abc").is_none());
    }

    #[test]
    fn misplaced_marker_fails_to_parse() {
        assert!(ReadRequest::from_resource_name("inst/notblobs/abc/10").is_none());
        assert!(WriteRequest::from_resource_name("inst/notuploads/u/blobs/abc/10").is_none());
        assert!(WriteRequest::from_resource_name("inst/uploads/u/notblobs/abc/10").is_none());
    }

    #[test]
    fn size_is_parsed_as_a_full_64_bit_integer() {
        // §9 Open Question (ii): use 64-bit parsing, not a truncating `stoi`.
        let big = 9_000_000_000_000_000_000u64;
        let d = ArtifactDigest::from_hex(HashFamily::PlainSha256, "a".repeat(64), big, false).unwrap();
        let req = ReadRequest::new("inst", &d);
        let parsed = ReadRequest::from_resource_name(&req.to_resource_name()).unwrap();
        assert_eq!(parsed.size(), big);
    }
}

use bb_hash::{ArtifactDigest, HashFamily};
use bb_model::ObjectType;
use serde_json::{json, Value};

/// One entry of a canonical, locally-chosen tree serialisation: name, kind,
/// and the digest of the referenced object. The git-framing rules of §6.3
/// apply to *this* byte sequence when an owning [`crate::CasKind::Tree`]
/// object is hashed, not to git's own on-disk tree format — the CAS never
/// interoperates with an external git object database directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub object_type: ObjectType,
    pub digest: ArtifactDigest,
}

fn object_type_str(t: ObjectType) -> &'static str {
    match t {
        ObjectType::File => "file",
        ObjectType::Executable => "executable",
        ObjectType::Symlink => "symlink",
        ObjectType::Tree => "tree",
    }
}

fn object_type_from_str(s: &str) -> Option<ObjectType> {
    match s {
        "file" => Some(ObjectType::File),
        "executable" => Some(ObjectType::Executable),
        "symlink" => Some(ObjectType::Symlink),
        "tree" => Some(ObjectType::Tree),
        _ => None,
    }
}

pub fn encode(entries: &[TreeEntry]) -> Vec<u8> {
    let array: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "name": e.name,
                "type": object_type_str(e.object_type),
                "hash": e.digest.hash(),
                "size": e.digest.size(),
            })
        })
        .collect();
    serde_json::to_vec(&Value::Array(array)).expect("tree entries always serialize")
}

pub fn decode(bytes: &[u8], hash_family: HashFamily) -> Option<Vec<TreeEntry>> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let array = value.as_array()?;
    let mut entries = Vec::with_capacity(array.len());
    for item in array {
        let name = item.get("name")?.as_str()?.to_string();
        let object_type = object_type_from_str(item.get("type")?.as_str()?)?;
        let hash = item.get("hash")?.as_str()?.to_string();
        let size = item.get("size")?.as_u64()?;
        let digest = ArtifactDigest::from_hex(hash_family, hash, size, object_type.is_tree()).ok()?;
        entries.push(TreeEntry { name, object_type, digest });
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entries() {
        let digest = ArtifactDigest::hash_data_as(HashFamily::GitSha1, b"hi", false);
        let entries = vec![TreeEntry {
            name: "a.txt".into(),
            object_type: ObjectType::File,
            digest,
        }];
        let bytes = encode(&entries);
        let decoded = decode(&bytes, HashFamily::GitSha1).unwrap();
        assert_eq!(decoded, entries);
    }
}

use bb_hash::{ArtifactDigest, HashFamily};
use serde_json::{json, Value};

use crate::object::ObjectType;

/// Tagged variant of an artifact reference (§3 "Artifact Description"). Each
/// variant has a canonical JSON projection; `to_json`/`from_json` round-trip
/// (Invariant 4, §8).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactDescription {
    Local { repository: String, path: String },
    Known { digest: ArtifactDigest, object_type: ObjectType },
    Action { action_id: String, output_path: String },
    Tree { tree_id: String },
}

fn family_to_str(family: HashFamily) -> &'static str {
    match family {
        HashFamily::GitSha1 => "git-sha1",
        HashFamily::PlainSha256 => "plain-sha256",
    }
}

fn family_from_str(s: &str) -> Option<HashFamily> {
    match s {
        "git-sha1" => Some(HashFamily::GitSha1),
        "plain-sha256" => Some(HashFamily::PlainSha256),
        _ => None,
    }
}

fn object_type_to_str(t: ObjectType) -> &'static str {
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

fn digest_to_json(digest: &ArtifactDigest) -> Value {
    json!({
        "hash": digest.hash(),
        "size": digest.size(),
        "family": family_to_str(digest.family()),
        "is_tree": digest.is_tree(),
    })
}

fn digest_from_json(value: &Value) -> Option<ArtifactDigest> {
    let hash = value.get("hash")?.as_str()?.to_string();
    let size = value.get("size")?.as_u64()?;
    let family = family_from_str(value.get("family")?.as_str()?)?;
    let is_tree = value.get("is_tree")?.as_bool()?;
    ArtifactDigest::from_hex(family, hash, size, is_tree).ok()
}

impl ArtifactDescription {
    pub fn to_json(&self) -> Value {
        match self {
            ArtifactDescription::Local { repository, path } => json!({
                "type": "local",
                "repository": repository,
                "path": path,
            }),
            ArtifactDescription::Known { digest, object_type } => json!({
                "type": "known",
                "digest": digest_to_json(digest),
                "object_type": object_type_to_str(*object_type),
            }),
            ArtifactDescription::Action { action_id, output_path } => json!({
                "type": "action",
                "action_id": action_id,
                "output_path": output_path,
            }),
            ArtifactDescription::Tree { tree_id } => json!({
                "type": "tree",
                "tree_id": tree_id,
            }),
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        let tag = value.get("type")?.as_str()?;
        match tag {
            "local" => Some(ArtifactDescription::Local {
                repository: value.get("repository")?.as_str()?.to_string(),
                path: value.get("path")?.as_str()?.to_string(),
            }),
            "known" => Some(ArtifactDescription::Known {
                digest: digest_from_json(value.get("digest")?)?,
                object_type: object_type_from_str(value.get("object_type")?.as_str()?)?,
            }),
            "action" => Some(ArtifactDescription::Action {
                action_id: value.get("action_id")?.as_str()?.to_string(),
                output_path: value.get("output_path")?.as_str()?.to_string(),
            }),
            "tree" => Some(ArtifactDescription::Tree {
                tree_id: value.get("tree_id")?.as_str()?.to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_hash::HashFamily;

    fn round_trip(description: ArtifactDescription) {
        let value = description.to_json();
        let parsed = ArtifactDescription::from_json(&value).expect("round trip must parse");
        assert_eq!(parsed, description);
    }

    #[test]
    fn local_round_trips() {
        round_trip(ArtifactDescription::Local {
            repository: "main".into(),
            path: "src/lib.rs".into(),
        });
    }

    #[test]
    fn known_round_trips() {
        let digest = ArtifactDigest::hash_data_as(HashFamily::GitSha1, b"hello", false);
        round_trip(ArtifactDescription::Known {
            digest,
            object_type: ObjectType::File,
        });
    }

    #[test]
    fn action_round_trips() {
        round_trip(ArtifactDescription::Action {
            action_id: "abc123".into(),
            output_path: "out/bin".into(),
        });
    }

    #[test]
    fn tree_round_trips() {
        round_trip(ArtifactDescription::Tree {
            tree_id: "deadbeef".into(),
        });
    }

    #[test]
    fn malformed_json_fails_to_parse() {
        assert!(ArtifactDescription::from_json(&json!({"type": "unknown"})).is_none());
        assert!(ArtifactDescription::from_json(&json!({"repository": "main"})).is_none());
    }
}

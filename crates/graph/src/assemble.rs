use std::collections::BTreeMap;

use bb_execapi::{ExecutionApi, ExecutionApiError, ExecutionApiResult};
use bb_hash::ArtifactDigest;
use bb_model::{ObjectInfo, ObjectType};
use bb_storage::TreeEntry;

/// A directory trie built from flat staged paths, used to assemble nested
/// tree objects bottom-up before uploading the root (§4.7 step 1).
#[derive(Default)]
struct DirNode {
    leaves: BTreeMap<String, ObjectInfo>,
    children: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, info: ObjectInfo) {
        match path.split_once('/') {
            None => {
                self.leaves.insert(path.to_string(), info);
            }
            Some((head, rest)) => {
                self.children.entry(head.to_string()).or_default().insert(rest, info);
            }
        }
    }

    async fn upload(&self, api: &dyn ExecutionApi) -> ExecutionApiResult<ArtifactDigest> {
        let mut entries = Vec::new();
        for (name, info) in &self.leaves {
            entries.push(TreeEntry {
                name: name.clone(),
                object_type: info.object_type(),
                digest: info.digest().clone(),
            });
        }
        for (name, child) in &self.children {
            let digest = Box::pin(child.upload(api)).await?;
            entries.push(TreeEntry {
                name: name.clone(),
                object_type: ObjectType::Tree,
                digest,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        api.upload_tree(&entries).await
    }
}

/// Assembles a single root tree from a flat map of staged paths (§4.6 step 4
/// / §4.7 step 1). A lone entry staged at `.` that is already a tree is
/// reused directly rather than wrapped in another layer.
pub async fn assemble_root_tree(api: &dyn ExecutionApi, staged: &BTreeMap<String, ObjectInfo>) -> ExecutionApiResult<ArtifactDigest> {
    if let Some(info) = staged.get(".") {
        if staged.len() == 1 && info.object_type() == ObjectType::Tree {
            return Ok(info.digest().clone());
        }
    }
    let mut root = DirNode::default();
    for (path, info) in staged {
        if info.failed() {
            return Err(ExecutionApiError::Upload(format!("input at {path:?} comes from a failed action")));
        }
        root.insert(path, info.clone());
    }
    root.upload(api).await
}

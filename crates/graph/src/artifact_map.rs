use std::path::Path;
use std::sync::{Arc, OnceLock};

use bb_asyncmap::{AsyncMapConsumer, Logger, Setter, SubCaller, ValueCreator};
use bb_execapi::{ExecutionApi, ExecutionApiResult};
use bb_fileroot::FileRoot;
use bb_hash::{ArtifactDigest, HashFamily, HashInfo};
use bb_model::{ArtifactBlob, ArtifactId, ContentSource, ObjectInfo, ObjectType};
use bb_repo::RepositoryConfig;
use bb_storage::TreeEntry;
use bb_task::TaskSystem;
use tokio::runtime::Handle;

use crate::action_map::ActionOutputs;

/// Memoised `ArtifactId -> ObjectInfo` resolution (§4.7 step 1, first half):
/// `Local` reads source content off a repository's file root and uploads it;
/// `Known` is already fully described; `Tree` wraps a bare declared tree id
/// (size is irrelevant for CAS lookups, which key on hash alone, so `0` is
/// used as a placeholder); `Action` waits on the producing action and pulls
/// its declared output.
pub type ArtifactMap = AsyncMapConsumer<ArtifactId, ObjectInfo>;

#[allow(clippy::too_many_arguments)]
pub fn make_value_creator(
    repo: Arc<RepositoryConfig>,
    api: Arc<dyn ExecutionApi>,
    runtime: Handle,
    hash_family: HashFamily,
    action_cell: Arc<OnceLock<Arc<AsyncMapConsumer<String, ActionOutputs>>>>,
) -> ValueCreator<ArtifactId, ObjectInfo> {
    Arc::new(
        move |ts: Arc<TaskSystem>, setter: Setter<ObjectInfo>, logger: Logger, _sub_caller: SubCaller<ArtifactId, ObjectInfo>, key: ArtifactId| match key {
            ArtifactId::Known { digest, object_type } => {
                setter(ObjectInfo::new(digest, object_type));
            }
            ArtifactId::Tree { tree_id } => match HashInfo::create(hash_family, tree_id.clone(), true) {
                Ok(info) => setter(ObjectInfo::new(ArtifactDigest::new(info, 0), ObjectType::Tree)),
                Err(err) => logger(&format!("invalid tree id {tree_id:?}: {err}"), true),
            },
            ArtifactId::Local { repository, path } => {
                let Some(root) = repo.workspace_root(&repository) else {
                    logger(&format!("unknown repository {repository:?}"), true);
                    return;
                };
                match runtime.block_on(resolve_local(api.as_ref(), root, Path::new(&path), hash_family)) {
                    Ok(info) => setter(info),
                    Err(err) => logger(&format!("resolving {repository}:{path}: {err}"), true),
                }
            }
            ArtifactId::Action { action_id, output_path } => {
                let action_map = Arc::clone(action_cell.get().expect("action map initialised before artifacts are requested"));
                let fail_logger = Arc::clone(&logger);
                action_map.consume_after_keys_ready(
                    &ts,
                    vec![action_id.clone()],
                    Box::new(move |values| {
                        let outputs = &values[0].outputs;
                        match outputs.get(&output_path) {
                            Some(info) => setter(info.clone()),
                            None => logger(&format!("action {action_id} produced no output at {output_path:?}"), true),
                        }
                    }),
                    Arc::clone(&fail_logger),
                    Some(Arc::new(move || fail_logger("dependency action failed", true))),
                );
            }
        },
    )
}

/// Reads `path` off `root`, uploads it to `api`, and returns the resulting
/// `ObjectInfo`. Directories recurse and are assembled into a tree.
fn resolve_local<'a>(api: &'a dyn ExecutionApi, root: &'a FileRoot, path: &'a Path, hash_family: HashFamily) -> std::pin::Pin<Box<dyn std::future::Future<Output = ExecutionApiResult<ObjectInfo>> + Send + 'a>> {
    Box::pin(async move {
        if root.is_directory(path) {
            let entries = root.read_directory(path);
            let mut tree_entries = Vec::new();
            for (name, _) in entries.iter() {
                let child_path = path.join(name);
                let child_info = resolve_local(api, root, &child_path, hash_family).await?;
                tree_entries.push(TreeEntry {
                    name: name.to_string(),
                    object_type: child_info.object_type(),
                    digest: child_info.digest().clone(),
                });
            }
            tree_entries.sort_by(|a, b| a.name.cmp(&b.name));
            let digest = api.upload_tree(&tree_entries).await?;
            return Ok(ObjectInfo::new(digest, ObjectType::Tree));
        }

        let object_type = root.file_type(path).unwrap_or(ObjectType::File);
        let bytes = if object_type == ObjectType::Symlink {
            symlink_target_text(root, path)
        } else {
            root.read_file(path)
        }
        .ok_or_else(|| bb_execapi::ExecutionApiError::NotFound(path.display().to_string()))?;

        let is_executable = object_type == ObjectType::Executable;
        let digest = ArtifactDigest::hash_data_as(hash_family, &bytes, false);
        let blob = ArtifactBlob::new(digest.clone(), owned_or_staged(bytes)?, is_executable);
        let uploaded = api.upload_blob(&blob).await?;
        Ok(ObjectInfo::new(uploaded, object_type))
    })
}

/// A filesystem symlink's target text, *not* the content it points at — an
/// `FsRoot` has no tree-backed link representation, unlike a `Git` root
/// where `read_file` already returns the blob holding the link text.
fn symlink_target_text(root: &FileRoot, path: &Path) -> Option<Vec<u8>> {
    match root {
        FileRoot::Fs(base) => std::fs::read_link(base.join(path)).ok().map(|target| target.to_string_lossy().into_owned().into_bytes()),
        other => other.read_file(path),
    }
}

/// `ContentSource` only has an owned-string or a path variant; arbitrary
/// bytes that are not valid UTF-8 (a binary source file) are spilled to a
/// scratch file so they survive the round trip unmodified.
fn owned_or_staged(bytes: Vec<u8>) -> ExecutionApiResult<ContentSource> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(ContentSource::Owned(text)),
        Err(err) => {
            let bytes = err.into_bytes();
            let tmp = tempfile::NamedTempFile::new()?;
            std::fs::write(tmp.path(), &bytes)?;
            let (_, path) = tmp.keep().map_err(|e| bb_execapi::ExecutionApiError::Upload(e.to_string()))?;
            Ok(ContentSource::Path(path))
        }
    }
}

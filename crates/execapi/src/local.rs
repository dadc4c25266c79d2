use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bb_hash::ArtifactDigest;
use bb_model::{ArtifactBlob, ContentSource, ObjectInfo, ObjectType};
use bb_storage::{CasKind, LocalCas};
use bb_util::TmpDir;
use parking_lot::Mutex;
use tokio::process::Command;

use crate::api::{CacheMode, ExecutionAction, ExecutionApi, ExecutionResult};
use crate::error::{ExecutionApiError, ExecutionApiResult};

/// Runs actions on this machine against a local [`LocalCas`] (§4.7, §6.4).
/// Inputs are materialised from the root tree into a scratch directory,
/// the command is run with that directory as its working directory, and
/// declared outputs are hashed back into the CAS. A small in-memory action
/// cache backs `CacheMode::FromCacheOnly`/`CacheOutput`: a real cache miss
/// on `FromCacheOnly` is an error, never a silent execution (§7).
pub struct LocalApi {
    cas: Arc<LocalCas>,
    action_cache: Mutex<BTreeMap<String, ExecutionResult>>,
}

impl LocalApi {
    pub fn new(cas: Arc<LocalCas>) -> Self {
        Self { cas, action_cache: Mutex::new(BTreeMap::new()) }
    }

    /// Digests the parts of an action that determine its outcome (command,
    /// environment, input root, declared outputs) into an action-cache key.
    /// Distinct from a REAPI `Action` digest — this never leaves the
    /// process, so it need not match any wire encoding.
    fn action_cache_key(&self, action: &ExecutionAction) -> String {
        let mut buf = Vec::new();
        buf.extend_from_slice(action.input_root_digest.hash().as_bytes());
        buf.push(0);
        for arg in &action.command {
            buf.extend_from_slice(arg.as_bytes());
            buf.push(0);
        }
        for (k, v) in &action.env {
            buf.extend_from_slice(k.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(v.as_bytes());
            buf.push(0);
        }
        for path in action.output_files.iter().chain(action.output_dirs.iter()) {
            buf.extend_from_slice(path.as_bytes());
            buf.push(0);
        }
        let digest = ArtifactDigest::hash_data_as(self.cas.config().hash_family(), &buf, false);
        digest.hash().to_string()
    }

    fn materialize_tree(&self, digest: &ArtifactDigest, dest: &Path) -> ExecutionApiResult<()> {
        std::fs::create_dir_all(dest)?;
        let entries = self.cas.read_tree_entries(digest)?;
        for entry in entries {
            let path = dest.join(&entry.name);
            match entry.object_type {
                ObjectType::Tree => self.materialize_tree(&entry.digest, &path)?,
                ObjectType::File | ObjectType::Executable => {
                    let kind = if entry.object_type == ObjectType::Executable {
                        CasKind::Executable
                    } else {
                        CasKind::File
                    };
                    let bytes = self.cas.read_bytes(kind, &entry.digest)?;
                    std::fs::write(&path, bytes)?;
                    if entry.object_type == ObjectType::Executable {
                        let mut perms = std::fs::metadata(&path)?.permissions();
                        perms.set_mode(0o755);
                        std::fs::set_permissions(&path, perms)?;
                    }
                }
                ObjectType::Symlink => {
                    let bytes = self.cas.read_bytes(CasKind::File, &entry.digest)?;
                    let target = String::from_utf8_lossy(&bytes).into_owned();
                    #[cfg(unix)]
                    std::os::unix::fs::symlink(target, &path)?;
                }
            }
        }
        Ok(())
    }

    fn capture_output(&self, root: &Path, rel_path: &str) -> ExecutionApiResult<Option<ObjectInfo>> {
        let path = root.join(rel_path);
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };
        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(&path)?;
            let digest = self.cas.store_bytes(CasKind::File, target.to_string_lossy().as_bytes())?;
            return Ok(Some(ObjectInfo::new(digest, ObjectType::Symlink)));
        }
        if meta.is_dir() {
            let digest = self.store_dir(&path)?;
            return Ok(Some(ObjectInfo::new(digest, ObjectType::Tree)));
        }
        let executable = meta.permissions().mode() & 0o111 != 0;
        let digest = self.cas.store_file(if executable { CasKind::Executable } else { CasKind::File }, &path)?;
        Ok(Some(ObjectInfo::new(digest, if executable { ObjectType::Executable } else { ObjectType::File })))
    }

    fn store_dir(&self, dir: &Path) -> ExecutionApiResult<ArtifactDigest> {
        let mut entries = Vec::new();
        let mut names: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        names.sort_by_key(|e| e.file_name());
        for entry in names {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            let meta = entry.metadata()?;
            let (object_type, digest) = if meta.is_dir() {
                (ObjectType::Tree, self.store_dir(&path)?)
            } else if meta.permissions().mode() & 0o111 != 0 {
                (ObjectType::Executable, self.cas.store_file(CasKind::Executable, &path)?)
            } else {
                (ObjectType::File, self.cas.store_file(CasKind::File, &path)?)
            };
            entries.push(bb_storage::TreeEntry { name, object_type, digest });
        }
        Ok(self.cas.store_tree_entries(&entries)?)
    }
}

#[async_trait]
impl ExecutionApi for LocalApi {
    async fn is_available(&self, digest: &ArtifactDigest) -> ExecutionApiResult<bool> {
        for kind in [CasKind::File, CasKind::Executable, CasKind::Tree] {
            if self.cas.path_if_present(kind, digest).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn upload_blob(&self, blob: &ArtifactBlob) -> ExecutionApiResult<ArtifactDigest> {
        let kind = if blob.is_executable() { CasKind::Executable } else { CasKind::File };
        let digest = match blob.source() {
            ContentSource::Owned(content) => self.cas.store_bytes(kind, content.as_bytes())?,
            ContentSource::Path(path) => self.cas.store_file(kind, path)?,
        };
        Ok(digest)
    }

    async fn retrieve_blob(&self, digest: &ArtifactDigest) -> ExecutionApiResult<Vec<u8>> {
        for kind in [CasKind::File, CasKind::Executable] {
            if let Ok(bytes) = self.cas.read_bytes(kind, digest) {
                return Ok(bytes);
            }
        }
        Err(ExecutionApiError::NotFound(digest.hash().to_string()))
    }

    async fn upload_tree(&self, entries: &[bb_storage::TreeEntry]) -> ExecutionApiResult<ArtifactDigest> {
        Ok(self.cas.store_tree_entries(entries)?)
    }

    async fn execute(&self, action: ExecutionAction) -> ExecutionApiResult<ExecutionResult> {
        let key = self.action_cache_key(&action);

        if matches!(action.cache_mode, CacheMode::FromCacheOnly) {
            return self
                .action_cache
                .lock()
                .get(&key)
                .cloned()
                .map(|mut result| {
                    result.from_cache = true;
                    result
                })
                .ok_or(ExecutionApiError::NotFound(key));
        }

        let scratch = TmpDir::new()?;
        self.materialize_tree(&action.input_root_digest, scratch.path())?;

        if action.command.is_empty() {
            // Tree actions never reach `execute`; the executor (§4.7 step 2)
            // short-circuits them to the assembled root tree's digest.
            return Err(ExecutionApiError::Upload("a tree action has no command to execute".into()));
        }

        let mut cmd = Command::new(&action.command[0]);
        cmd.args(&action.command[1..]);
        cmd.current_dir(scratch.path());
        cmd.env_clear();
        for (k, v) in &action.env {
            cmd.env(k, v);
        }

        let output = match cmd.output().await {
            Ok(o) => o,
            Err(_) => return Ok(ExecutionResult { exit_code: None, ..Default::default() }),
        };

        let mut outputs = BTreeMap::new();
        for path in action.output_files.iter().chain(action.output_dirs.iter()) {
            if let Some(info) = self.capture_output(scratch.path(), path)? {
                outputs.insert(path.clone(), info);
            }
        }

        let result = ExecutionResult {
            exit_code: output.status.code(),
            outputs,
            from_cache: false,
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if matches!(action.cache_mode, CacheMode::CacheOutput) {
            self.action_cache.lock().insert(key, result.clone());
        }

        Ok(result)
    }
}

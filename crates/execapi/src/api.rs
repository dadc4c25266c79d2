use std::collections::BTreeMap;

use async_trait::async_trait;
use bb_hash::ArtifactDigest;
use bb_model::{ArtifactBlob, ObjectInfo};
use bb_storage::TreeEntry;

use crate::error::ExecutionApiResult;

/// §7 "`CacheOutput` / `DoNotCacheOutput` / `FromCacheOnly` / `PretendCached`"
/// — how an action's result relates to the action cache. `PretendCached` is
/// used by the rebuilder (§4.7) to run a second, uncounted execution for
/// flaky-action comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    CacheOutput,
    DoNotCacheOutput,
    FromCacheOnly,
    PretendCached,
}

/// One action submission (§3 "Action (graph node)" projected onto the wire):
/// the assembled root tree plus everything the executor (§4.7) needs to
/// dispatch it.
#[derive(Debug, Clone)]
pub struct ExecutionAction {
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub input_root_digest: ArtifactDigest,
    pub output_files: Vec<String>,
    pub output_dirs: Vec<String>,
    pub timeout_scale: f64,
    pub execution_properties: BTreeMap<String, String>,
    pub cache_mode: CacheMode,
}

/// Outcome of `execute` (§4.7 step 5). `exit_code` is `None` exactly when no
/// response was received at all (§7 "Execution: ... response absent").
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub outputs: BTreeMap<String, ObjectInfo>,
    /// True when the action cache served this result rather than running it;
    /// never true under `CacheMode::PretendCached` (§4.7 step 6).
    pub from_cache: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Uniform `CreateAction`/`Upload`/`Retrieve` surface over a local or remote
/// execution backend (§2 C7, §4.7). Implementors: `LocalApi` (runs commands
/// on this machine against the local CAS) and `BazelApi` (speaks the trimmed
/// REAPI subset of §6.1 to a remote endpoint).
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// True if the object is present and retrievable through this API
    /// without any further upload.
    async fn is_available(&self, digest: &ArtifactDigest) -> ExecutionApiResult<bool>;

    /// Uploads a blob's content, a no-op if already present remotely.
    async fn upload_blob(&self, blob: &ArtifactBlob) -> ExecutionApiResult<ArtifactDigest>;

    /// Reads a blob's raw bytes back (§8 invariant 6: upload then retrieve
    /// round-trips).
    async fn retrieve_blob(&self, digest: &ArtifactDigest) -> ExecutionApiResult<Vec<u8>>;

    /// Uploads a directory's shape (§4.7 step 1, "assembling inputs with
    /// their staged paths"), returning the digest of the resulting tree
    /// object. The concrete wire encoding of a tree is a named out-of-scope
    /// collaborator per §1 ("concrete wire encoding of the Bazel RE
    /// protocol"); both backends use the same internal tree serialisation
    /// (`bb_storage::encode_tree_entries`) rather than building a full REAPI
    /// `Directory` proto.
    async fn upload_tree(&self, entries: &[TreeEntry]) -> ExecutionApiResult<ArtifactDigest>;

    /// Submits and runs one action (§4.7 steps 3-5).
    async fn execute(&self, action: ExecutionAction) -> ExecutionApiResult<ExecutionResult>;
}

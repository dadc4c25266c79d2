use std::collections::BTreeMap;

use async_trait::async_trait;
use bb_hash::{ArtifactDigest, HashFamily};
use bb_model::{ArtifactBlob, ContentSource, ObjectInfo, ObjectType};
use bb_proto::bazel_re::{
    action_cache_client::ActionCacheClient,
    content_addressable_storage_client::ContentAddressableStorageClient,
    execution_client::ExecutionClient,
    Action as ReAction, BatchReadBlobsRequest, BatchUpdateBlobsRequest, Command as ReCommand, Digest,
    ExecuteRequest, FindMissingBlobsRequest, Platform,
};
use prost::Message;
use tonic::transport::Channel;
use tonic::Request;

use crate::api::{CacheMode, ExecutionAction, ExecutionApi, ExecutionResult};
use crate::error::{ExecutionApiError, ExecutionApiResult};

fn to_digest(d: &ArtifactDigest) -> Digest {
    Digest {
        hash: d.hash().to_string(),
        size_bytes: d.size() as i64,
    }
}

fn from_digest(d: &Digest, family: HashFamily, is_tree: bool) -> ExecutionApiResult<ArtifactDigest> {
    ArtifactDigest::from_hex(family, d.hash.clone(), d.size_bytes.max(0) as u64, is_tree)
        .map_err(|e| ExecutionApiError::Upload(e.to_string()))
}

/// Speaks the trimmed REAPI subset of §6.1 to a remote endpoint (C7):
/// `Capabilities`, CAS batch operations, `ActionCache.GetActionResult`
/// (implicitly, via `skip_cache_lookup`) and `Execution.Execute`.
pub struct BazelApi {
    channel: Channel,
    instance_name: String,
    hash_family: HashFamily,
}

impl BazelApi {
    pub async fn connect(endpoint: impl Into<String>, instance_name: impl Into<String>, hash_family: HashFamily) -> ExecutionApiResult<Self> {
        let channel = Channel::from_shared(endpoint.into())
            .map_err(|e| ExecutionApiError::Upload(e.to_string()))?
            .connect()
            .await?;
        Ok(Self {
            channel,
            instance_name: instance_name.into(),
            hash_family,
        })
    }

    fn cas_client(&self) -> ContentAddressableStorageClient<Channel> {
        ContentAddressableStorageClient::new(self.channel.clone())
    }

    fn exec_client(&self) -> ExecutionClient<Channel> {
        ExecutionClient::new(self.channel.clone())
    }

    fn action_cache_client(&self) -> ActionCacheClient<Channel> {
        ActionCacheClient::new(self.channel.clone())
    }

    async fn upload_bytes(&self, digest: &ArtifactDigest, bytes: Vec<u8>) -> ExecutionApiResult<()> {
        let mut client = self.cas_client();
        client
            .batch_update_blobs(Request::new(BatchUpdateBlobsRequest {
                instance_name: self.instance_name.clone(),
                requests: vec![bb_proto::bazel_re::batch_update_blobs_request::Request {
                    digest: Some(to_digest(digest)),
                    data: bytes,
                }],
            }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionApi for BazelApi {
    async fn is_available(&self, digest: &ArtifactDigest) -> ExecutionApiResult<bool> {
        let mut client = self.cas_client();
        let resp = client
            .find_missing_blobs(Request::new(FindMissingBlobsRequest {
                instance_name: self.instance_name.clone(),
                blob_digests: vec![to_digest(digest)],
            }))
            .await?
            .into_inner();
        Ok(resp.missing_blob_digests.is_empty())
    }

    async fn upload_blob(&self, blob: &ArtifactBlob) -> ExecutionApiResult<ArtifactDigest> {
        let bytes = match blob.source() {
            ContentSource::Owned(s) => s.clone().into_bytes(),
            ContentSource::Path(p) => std::fs::read(p)?,
        };
        self.upload_bytes(blob.digest(), bytes).await?;
        Ok(blob.digest().clone())
    }

    async fn retrieve_blob(&self, digest: &ArtifactDigest) -> ExecutionApiResult<Vec<u8>> {
        let mut client = self.cas_client();
        let resp = client
            .batch_read_blobs(Request::new(BatchReadBlobsRequest {
                instance_name: self.instance_name.clone(),
                digests: vec![to_digest(digest)],
            }))
            .await?
            .into_inner();
        resp.responses
            .into_iter()
            .next()
            .map(|r| r.data)
            .ok_or_else(|| ExecutionApiError::NotFound(digest.hash().to_string()))
    }

    async fn upload_tree(&self, entries: &[bb_storage::TreeEntry]) -> ExecutionApiResult<ArtifactDigest> {
        let bytes = bb_storage::encode_tree_entries(entries);
        let digest = ArtifactDigest::hash_data_as(self.hash_family, &bytes, true);
        self.upload_bytes(&digest, bytes).await?;
        Ok(digest)
    }

    async fn execute(&self, action: ExecutionAction) -> ExecutionApiResult<ExecutionResult> {
        let platform = Platform {
            properties: action
                .execution_properties
                .iter()
                .map(|(k, v)| bb_proto::bazel_re::platform::Property { name: k.clone(), value: v.clone() })
                .collect(),
        };
        let command = ReCommand {
            arguments: action.command.clone(),
            environment_variables: action
                .env
                .iter()
                .map(|(k, v)| bb_proto::bazel_re::command::EnvironmentVariable { name: k.clone(), value: v.clone() })
                .collect(),
            output_files: action.output_files.clone(),
            output_directories: action.output_dirs.clone(),
            platform: Some(platform.clone()),
        };
        let command_bytes = command.encode_to_vec();
        let command_digest = ArtifactDigest::hash_data_as(self.hash_family, &command_bytes, false);
        self.upload_bytes(&command_digest, command_bytes).await?;

        let re_action = ReAction {
            command_digest: Some(to_digest(&command_digest)),
            input_root_digest: Some(to_digest(&action.input_root_digest)),
            timeout_seconds: (60.0 * action.timeout_scale).round() as i64,
            do_not_cache: matches!(action.cache_mode, CacheMode::DoNotCacheOutput),
            platform: Some(platform),
        };
        let action_bytes = re_action.encode_to_vec();
        let action_digest = ArtifactDigest::hash_data_as(self.hash_family, &action_bytes, false);
        self.upload_bytes(&action_digest, action_bytes).await?;

        if matches!(action.cache_mode, CacheMode::FromCacheOnly) {
            let mut client = self.action_cache_client();
            let result = client
                .get_action_result(Request::new(bb_proto::bazel_re::GetActionResultRequest {
                    instance_name: self.instance_name.clone(),
                    action_digest: Some(to_digest(&action_digest)),
                }))
                .await?
                .into_inner();
            return self.action_result_to_execution_result(result, true);
        }

        let mut client = self.exec_client();
        let skip_cache_lookup = matches!(action.cache_mode, CacheMode::PretendCached | CacheMode::DoNotCacheOutput);
        let response = client
            .execute(Request::new(ExecuteRequest {
                instance_name: self.instance_name.clone(),
                action_digest: Some(to_digest(&action_digest)),
                skip_cache_lookup,
            }))
            .await?
            .into_inner();

        let Some(result) = response.result else {
            return Ok(ExecutionResult { exit_code: None, ..Default::default() });
        };
        self.action_result_to_execution_result(result, response.cached_result)
    }
}

impl BazelApi {
    fn action_result_to_execution_result(&self, result: bb_proto::bazel_re::ActionResult, from_cache: bool) -> ExecutionApiResult<ExecutionResult> {
        let mut outputs = BTreeMap::new();
        for file in result.output_files {
            let Some(digest) = file.digest else { continue };
            let object_type = if file.is_executable { ObjectType::Executable } else { ObjectType::File };
            outputs.insert(file.path, ObjectInfo::new(from_digest(&digest, self.hash_family, false)?, object_type));
        }
        for dir in result.output_directories {
            let Some(digest) = dir.tree_digest else { continue };
            outputs.insert(dir.path, ObjectInfo::new(from_digest(&digest, self.hash_family, true)?, ObjectType::Tree));
        }
        Ok(ExecutionResult {
            exit_code: Some(result.exit_code),
            outputs,
            from_cache,
            stdout: result.stdout_raw,
            stderr: result.stderr_raw,
        })
    }
}

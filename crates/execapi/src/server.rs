//! A local-CAS-backed REAPI server (§6.1, named in the CLI's `serve-local`
//! convenience), the mirror image of [`crate::bazel::BazelApi`]'s client
//! side: `Capabilities`, the `ContentAddressableStorage` batch/tree RPCs,
//! `ByteStream.Read`/`Write`, and `ActionCache.GetActionResult` (always a
//! miss — this server has no action-cache store of its own). `Execution` is
//! deliberately left unimplemented: the concrete wire encoding an execution
//! service would drive is explicitly out of scope (§1), and this server
//! exists to let another process diff CAS/bytestream behaviour against
//! `bb-storage`, not to run actions.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bb_hash::{ArtifactDigest, HashFamily};
use bb_storage::{CasKind, LocalCas, TreeEntry};
use futures::Stream;
use tonic::{Request, Response, Status};

use bb_proto::bazel_re::{
    action_cache_server::{ActionCache, ActionCacheServer},
    batch_read_blobs_response, batch_update_blobs_response,
    capabilities_server::{Capabilities, CapabilitiesServer},
    content_addressable_storage_server::{ContentAddressableStorage, ContentAddressableStorageServer},
    execution_server::{Execution, ExecutionServer},
    ActionResult, BatchReadBlobsRequest, BatchReadBlobsResponse, BatchUpdateBlobsRequest,
    BatchUpdateBlobsResponse, Digest, Directory, DirectoryNode, ExecuteRequest, ExecuteResponse,
    FileNode, FindMissingBlobsRequest, FindMissingBlobsResponse, GetActionResultRequest,
    GetCapabilitiesRequest, GetTreeRequest, GetTreeResponse, ServerCapabilities, SymlinkNode,
};
use bb_proto::bytestream::{
    byte_stream_server::{ByteStream, ByteStreamServer},
    ReadRequest as ProtoReadRequest, ReadResponse, WriteRequest as ProtoWriteRequest, WriteResponse,
};
use bb_model::ObjectType;

use crate::bytestream::{ReadRequest, WriteRequest, CHUNK_SIZE};

/// Shared state behind every service impl: a local CAS plus the hash family
/// it was opened under (needed to reconstruct digests from bare hex/size).
pub struct LocalReapiServer {
    cas: Arc<LocalCas>,
    hash_family: HashFamily,
}

impl LocalReapiServer {
    pub fn new(cas: Arc<LocalCas>, hash_family: HashFamily) -> Self {
        Self { cas, hash_family }
    }

    fn digest_of(&self, d: &Digest, is_tree: bool) -> Result<ArtifactDigest, Status> {
        ArtifactDigest::from_hex(self.hash_family, d.hash.clone(), d.size_bytes.max(0) as u64, is_tree)
            .map_err(|e| Status::invalid_argument(e.to_string()))
    }

    fn read_kind(&self, kind: CasKind, digest: &ArtifactDigest) -> Option<Vec<u8>> {
        self.cas.read_bytes(kind, digest).ok()
    }

    fn directory_of(&self, digest: &ArtifactDigest) -> Result<Directory, Status> {
        let entries = self
            .cas
            .read_tree_entries(digest)
            .map_err(|e| Status::not_found(e.to_string()))?;
        Ok(to_directory(&entries))
    }
}

fn to_digest(d: &ArtifactDigest) -> Digest {
    Digest { hash: d.hash().to_string(), size_bytes: d.size() as i64 }
}

fn to_directory(entries: &[TreeEntry]) -> Directory {
    let mut directory = Directory::default();
    for entry in entries {
        match entry.object_type {
            ObjectType::File => directory.files.push(FileNode {
                name: entry.name.clone(),
                digest: Some(to_digest(&entry.digest)),
                is_executable: false,
            }),
            ObjectType::Executable => directory.files.push(FileNode {
                name: entry.name.clone(),
                digest: Some(to_digest(&entry.digest)),
                is_executable: true,
            }),
            ObjectType::Tree => directory.directories.push(DirectoryNode {
                name: entry.name.clone(),
                digest: Some(to_digest(&entry.digest)),
            }),
            ObjectType::Symlink => directory.symlinks.push(SymlinkNode {
                name: entry.name.clone(),
                target: String::new(),
            }),
        }
    }
    directory
}

#[tonic::async_trait]
impl Capabilities for LocalReapiServer {
    async fn get_capabilities(
        &self,
        _request: Request<GetCapabilitiesRequest>,
    ) -> Result<Response<ServerCapabilities>, Status> {
        Ok(Response::new(ServerCapabilities { high_api_version: true }))
    }
}

#[tonic::async_trait]
impl ContentAddressableStorage for LocalReapiServer {
    async fn find_missing_blobs(
        &self,
        request: Request<FindMissingBlobsRequest>,
    ) -> Result<Response<FindMissingBlobsResponse>, Status> {
        let req = request.into_inner();
        let mut missing = Vec::new();
        for d in req.blob_digests {
            let digest = self.digest_of(&d, false)?;
            let present = self.read_kind(CasKind::File, &digest).is_some()
                || self.read_kind(CasKind::Executable, &digest).is_some();
            if !present {
                missing.push(d);
            }
        }
        Ok(Response::new(FindMissingBlobsResponse { missing_blob_digests: missing }))
    }

    async fn batch_update_blobs(
        &self,
        request: Request<BatchUpdateBlobsRequest>,
    ) -> Result<Response<BatchUpdateBlobsResponse>, Status> {
        let req = request.into_inner();
        let mut responses = Vec::new();
        for entry in req.requests {
            let digest = entry.digest.clone();
            let status_code = match self.cas.store_bytes(CasKind::File, &entry.data) {
                Ok(_) => 0,
                Err(_) => 13, // INTERNAL
            };
            responses.push(batch_update_blobs_response::Response { digest, status_code });
        }
        Ok(Response::new(BatchUpdateBlobsResponse { responses }))
    }

    async fn batch_read_blobs(
        &self,
        request: Request<BatchReadBlobsRequest>,
    ) -> Result<Response<BatchReadBlobsResponse>, Status> {
        let req = request.into_inner();
        let mut responses = Vec::new();
        for d in req.digests {
            let Ok(digest) = self.digest_of(&d, false) else {
                responses.push(batch_read_blobs_response::Response { digest: Some(d), data: vec![], status_code: 3 });
                continue;
            };
            match self
                .read_kind(CasKind::File, &digest)
                .or_else(|| self.read_kind(CasKind::Executable, &digest))
            {
                Some(data) => responses.push(batch_read_blobs_response::Response { digest: Some(d), data, status_code: 0 }),
                None => responses.push(batch_read_blobs_response::Response { digest: Some(d), data: vec![], status_code: 5 }),
            }
        }
        Ok(Response::new(BatchReadBlobsResponse { responses }))
    }

    type GetTreeStream = Pin<Box<dyn Stream<Item = Result<GetTreeResponse, Status>> + Send + 'static>>;

    async fn get_tree(&self, request: Request<GetTreeRequest>) -> Result<Response<Self::GetTreeStream>, Status> {
        let req = request.into_inner();
        let root = req.root_digest.ok_or_else(|| Status::invalid_argument("missing root_digest"))?;
        let root_digest = self.digest_of(&root, true)?;

        let mut directories = Vec::new();
        collect_directories(self, &root_digest, &mut directories)?;

        let response = GetTreeResponse { directories, next_page_token: String::new() };
        let stream = futures::stream::once(async move { Ok(response) });
        Ok(Response::new(Box::pin(stream)))
    }
}

fn collect_directories(server: &LocalReapiServer, digest: &ArtifactDigest, out: &mut Vec<Directory>) -> Result<(), Status> {
    let entries = server
        .cas
        .read_tree_entries(digest)
        .map_err(|e| Status::not_found(e.to_string()))?;
    out.push(to_directory(&entries));
    for entry in &entries {
        if entry.object_type == ObjectType::Tree {
            collect_directories(server, &entry.digest, out)?;
        }
    }
    Ok(())
}

#[tonic::async_trait]
impl ActionCache for LocalReapiServer {
    async fn get_action_result(
        &self,
        _request: Request<GetActionResultRequest>,
    ) -> Result<Response<ActionResult>, Status> {
        Err(Status::not_found("this server keeps no action-cache entries"))
    }
}

#[tonic::async_trait]
impl Execution for LocalReapiServer {
    async fn execute(&self, _request: Request<ExecuteRequest>) -> Result<Response<ExecuteResponse>, Status> {
        Err(Status::unimplemented(
            "serve-local exposes CAS/ByteStream/ActionCache only; run actions through `bb build` instead",
        ))
    }
}

#[tonic::async_trait]
impl ByteStream for LocalReapiServer {
    type ReadStream = Pin<Box<dyn Stream<Item = Result<ReadResponse, Status>> + Send + 'static>>;

    async fn read(&self, request: Request<ProtoReadRequest>) -> Result<Response<Self::ReadStream>, Status> {
        let resource_name = request.into_inner().resource_name;
        let parsed = ReadRequest::from_resource_name(&resource_name)
            .ok_or_else(|| Status::invalid_argument(format!("malformed resource name {resource_name:?}")))?;
        let digest = parsed
            .digest(self.hash_family, false)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let data = self
            .read_kind(CasKind::File, &digest)
            .or_else(|| self.read_kind(CasKind::Executable, &digest))
            .ok_or_else(|| Status::not_found(parsed.hash().to_string()))?;

        let chunks: Vec<_> = data
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(ReadResponse { data: chunk.to_vec() }))
            .collect();
        Ok(Response::new(Box::pin(futures::stream::iter(chunks))))
    }

    async fn write(
        &self,
        request: Request<tonic::Streaming<ProtoWriteRequest>>,
    ) -> Result<Response<WriteResponse>, Status> {
        let mut stream = request.into_inner();
        let mut buffer = Vec::new();
        let mut parsed: Option<WriteRequest> = None;

        while let Some(chunk) = stream.message().await? {
            if parsed.is_none() && !chunk.resource_name.is_empty() {
                parsed = WriteRequest::from_resource_name(&chunk.resource_name);
            }
            buffer.extend_from_slice(&chunk.data);
            if chunk.finish_write {
                break;
            }
        }

        let parsed = parsed.ok_or_else(|| Status::invalid_argument("missing resource_name on first write chunk"))?;
        let expected = parsed
            .digest(self.hash_family, false)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let digest = self
            .cas
            .store_bytes(CasKind::File, &buffer)
            .map_err(|e| Status::internal(e.to_string()))?;
        if digest.hash() != expected.hash() {
            return Err(Status::invalid_argument("uploaded content does not match the declared digest"));
        }

        Ok(Response::new(WriteResponse { committed_size: buffer.len() as i64 }))
    }
}

/// Serves `cas` at `addr` until the process is interrupted. This is the
/// `serve-local` CLI subcommand's entire backend: the five service traits
/// above, wrapped into a `tonic::transport::Server` router.
pub async fn serve(cas: Arc<LocalCas>, hash_family: HashFamily, addr: SocketAddr) -> Result<(), tonic::transport::Error> {
    let server = Arc::new(LocalReapiServer::new(cas, hash_family));
    tonic::transport::Server::builder()
        .add_service(CapabilitiesServer::from_arc(Arc::clone(&server)))
        .add_service(ContentAddressableStorageServer::from_arc(Arc::clone(&server)))
        .add_service(ActionCacheServer::from_arc(Arc::clone(&server)))
        .add_service(ExecutionServer::from_arc(Arc::clone(&server)))
        .add_service(ByteStreamServer::from_arc(server))
        .serve(addr)
        .await
}

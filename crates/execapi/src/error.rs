use thiserror::Error;

/// §7 error kinds reachable from an execution backend: CAS object not found
/// on any tier, upload failure, I/O failure, a missing execution response.
#[derive(Debug, Error)]
pub enum ExecutionApiError {
    #[error("object {0} not found on any tier")]
    NotFound(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("execution response absent")]
    ResponseAbsent,
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("RPC failed: {0}")]
    Status(#[from] tonic::Status),
    #[error("storage error: {0}")]
    Storage(#[from] bb_storage::StorageError),
}

pub type ExecutionApiResult<T> = Result<T, ExecutionApiError>;

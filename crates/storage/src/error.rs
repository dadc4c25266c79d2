use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} not found in any generation")]
    NotFound(String),
    #[error("tree-structure cache already maps {key} to a different value than {existing}")]
    TreeStructureConflict { key: String, existing: String },
    #[error("object {0} must be present in the CAS before it can be coupled in the tree-structure cache")]
    MissingCoupledObject(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
/// Errors returned by cache and job stores.
pub enum StoreError {
    /// IO error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Job summary was not found.
    #[error("job not found: {id}")]
    JobNotFound { id: Uuid },

    /// A job with this id was already recorded.
    #[error("job already exists: {id}")]
    JobExists { id: Uuid },

    /// Key cannot be used as a storage location.
    #[error("invalid storage key: {key}")]
    InvalidKey { key: String },

    /// Storage root path is missing/unavailable.
    #[error("storage path unavailable: {path}")]
    StorageUnavailable { path: PathBuf },

    /// Backend refused the write.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

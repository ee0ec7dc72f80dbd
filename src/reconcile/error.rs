use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::embedding::EmbeddingError;
use crate::merge::MergeError;
use crate::storage::StoreError;

/// Errors from handing work to the reconciliation queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("reconciliation queue is full, job {job_id} not accepted")]
    Full { job_id: Uuid },

    #[error("reconciliation queue is closed, job {job_id} not accepted")]
    Closed { job_id: Uuid },

    #[error("ledger error: {0}")]
    Store(#[from] StoreError),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Why a reconciliation attempt failed. Recorded in the job summary.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("generated answers do not fit the skeleton: {0}")]
    Merge(#[from] MergeError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("job exceeded the {limit:?} time limit")]
    TimedOut { limit: Duration },
}

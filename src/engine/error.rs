use thiserror::Error;

use crate::generator::GeneratorError;
use crate::merge::MergeError;
use crate::storage::StoreError;

/// Request-path failures. No reconciliation job exists when one of these is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cache lookup failed: {0}")]
    Lookup(#[source] StoreError),

    #[error("question generation failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("generated answers could not be merged: {0}")]
    Merge(#[from] MergeError),

    #[error("job summary could not be recorded: {0}")]
    Ledger(#[source] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

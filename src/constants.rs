//! Cross-cutting, shared constants.
//!
//! Policy defaults live here so the config layer, the reader, and the worker agree on them.

/// Probability that a slot is allowed to be satisfied from cache.
pub const DEFAULT_CACHE_USAGE_RATE: f64 = 0.9;

/// Maximum cosine similarity between two selected questions before one counts as a duplicate.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.9;

/// Question type that is never served from or written to the cache.
pub const MATCH_THE_FOLLOWING: &str = "Match the following";

/// Default dimension of vectors produced by the stub embedder.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Default reconciliation queue depth before submissions are rejected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A job in progress longer than this is reported as stale.
pub const DEFAULT_STALE_JOB_SECS: u64 = 15 * 60;

/// Returns `true` if `question_type` names the "Match the following" format.
#[inline]
pub fn is_match_the_following(question_type: &str) -> bool {
    question_type.trim().eq_ignore_ascii_case(MATCH_THE_FOLLOWING)
}

/// Runtime embedding dimension shared by the embedder and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimConfig {
    /// The embedding vector dimension (number of floats).
    pub embedding_dim: usize,
}

impl Default for DimConfig {
    fn default() -> Self {
        Self {
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl DimConfig {
    /// Creates a new dimension configuration.
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }

    /// Rejects a zero dimension.
    pub fn validate(&self) -> Result<(), DimValidationError> {
        if self.embedding_dim == 0 {
            return Err(DimValidationError::ZeroDimension);
        }
        Ok(())
    }
}

/// Error returned when dimension validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DimValidationError {
    /// Embedding dimension cannot be zero.
    #[error("embedding dimension cannot be zero")]
    ZeroDimension,
    /// Runtime dimension does not match expected dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Validates that a runtime embedding dimension matches the expected dimension.
///
/// # Example
///
/// ```
/// use qbank::constants::{validate_embedding_dim, DEFAULT_EMBEDDING_DIM};
///
/// validate_embedding_dim(384, DEFAULT_EMBEDDING_DIM).unwrap();
/// ```
pub fn validate_embedding_dim(actual: usize, expected: usize) -> Result<(), DimValidationError> {
    if actual != expected {
        return Err(DimValidationError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

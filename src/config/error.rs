//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A float setting could not be parsed.
    #[error("failed to parse {name} '{value}': {source}")]
    FloatParseError {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    /// A probability/threshold setting is outside `[0, 1]`.
    #[error("invalid {name} {value}: must be between 0 and 1")]
    OutOfRange { name: &'static str, value: f64 },

    /// Queue capacity must be at least one.
    #[error("queue capacity must be greater than zero")]
    ZeroQueueCapacity,

    /// Embedding dimension must be at least one.
    #[error("embedding dimension must be greater than zero")]
    ZeroEmbeddingDim,

    /// Path exists but is not a directory (when a directory was expected).
    #[error("path is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

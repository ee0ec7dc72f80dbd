//! Embedding generation for new cache content.
//!
//! [`Embedder`] is the seam to a real model. [`StubEmbedder`] produces deterministic,
//! normalized vectors from text for tests. [`NoModelEmbedder`] refuses to embed, so a
//! process without a model never persists vectors.

mod error;

pub use error::EmbeddingError;

use async_trait::async_trait;
use tracing::debug;

use crate::constants::{DEFAULT_EMBEDDING_DIM, DimConfig};
use crate::hashing::hash_to_u64;

#[async_trait]
/// Turns normalized question text into a fixed-length vector.
pub trait Embedder: Send + Sync {
    /// Embeds one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds a batch. The default runs [`Embedder::embed`] sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Output dimension.
    fn embedding_dim(&self) -> usize;
}

/// Deterministic text-seeded embedder (testing/offline only).
#[derive(Debug, Clone)]
pub struct StubEmbedder {
    embedding_dim: usize,
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl StubEmbedder {
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        DimConfig::new(self.embedding_dim).validate()?;

        debug!(text_len = text.len(), "Generating stub embedding");

        let mut state = hash_to_u64(text.as_bytes());
        let mut embedding = Vec::with_capacity(self.embedding_dim);
        for _ in 0..self.embedding_dim {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let value = ((state >> 32) as f32 / u32::MAX as f32) * 2.0 - 1.0;
            embedding.push(value);
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text)
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

/// Embedder for processes with no model attached.
///
/// Every non-empty batch fails with [`EmbeddingError::NotConfigured`]. Jobs whose
/// embeddings are already stored still reconcile; the rest stay retryable.
#[derive(Debug, Clone)]
pub struct NoModelEmbedder {
    embedding_dim: usize,
}

impl NoModelEmbedder {
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }
}

#[async_trait]
impl Embedder for NoModelEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::NotConfigured)
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

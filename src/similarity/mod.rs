//! Cosine similarity helpers.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimilarityError {
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("cannot compare a zero-magnitude vector")]
    ZeroMagnitude,
}

/// Dot product over the product of magnitudes.
///
/// Errors instead of returning NaN when either vector has zero magnitude (including
/// empty vectors).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(SimilarityError::ZeroMagnitude);
    }

    Ok(dot_product / (norm_a * norm_b))
}

/// Linear scan for the candidate most similar to `target`.
///
/// Returns `None` when there is nothing comparable (empty list, or every candidate
/// failed [`cosine_similarity`]).
pub fn most_similar<V: AsRef<[f32]>>(candidates: &[V], target: &[f32]) -> Option<(usize, f32)> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| cosine_similarity(c.as_ref(), target).ok().map(|s| (i, s)))
        .fold(None, |best, (i, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((i, score)),
        })
}

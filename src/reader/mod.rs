//! Cache reader: decides which template slots are served from cache.
//!
//! The reader is pure. Embeddings are prefetched by the caller and randomness is
//! injected, so a seeded [`rand::rngs::StdRng`] makes every decision replayable.


use std::collections::HashMap;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::constants::{DEFAULT_CACHE_USAGE_RATE, DEFAULT_SIMILARITY_THRESHOLD};
use crate::hashing::hash_question_text;
use crate::model::{AnswerGroup, CacheEntry, CachedQuestion, Question, QuestionSlot, TemplateGroup};
use crate::similarity::{cosine_similarity, most_similar};

/// Positions missing from one original template group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualIndices {
    pub question_type: String,
    pub indices: Vec<usize>,
}

/// Hit/miss counters for one resolution (observability only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_decisions: usize,
    pub cache_hit_count: usize,
    pub cache_miss_count: usize,
}

impl CacheStats {
    fn record(&mut self, hit: bool) {
        self.total_decisions += 1;
        if hit {
            self.cache_hit_count += 1;
        } else {
            self.cache_miss_count += 1;
        }
    }
}

/// Output of [`CacheReader::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// One group per original template group, holding cache hits in slot order.
    pub answers: Vec<AnswerGroup>,
    /// Non-empty residual groups, in original order. Sent for generation.
    pub residual_template: Vec<TemplateGroup>,
    /// One entry per original group; `None` when nothing is missing.
    pub residual_indices: Vec<Option<ResidualIndices>>,
    pub stats: CacheStats,
}

impl Resolution {
    pub fn is_fully_cached(&self) -> bool {
        self.residual_template.is_empty()
    }
}

/// Sampling and novelty policy for cache reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheReader {
    cache_usage_rate: f64,
    similarity_threshold: f32,
}

impl Default for CacheReader {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_USAGE_RATE, DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl CacheReader {
    pub fn new(cache_usage_rate: f64, similarity_threshold: f32) -> Self {
        Self {
            cache_usage_rate: cache_usage_rate.clamp(0.0, 1.0),
            similarity_threshold,
        }
    }

    pub fn cache_usage_rate(&self) -> f64 {
        self.cache_usage_rate
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// Partitions `groups` into cache hits and a residual template.
    ///
    /// `embeddings` maps embedding hashes to vectors. Candidates without a usable vector
    /// are never offered: the slot falls through to a miss rather than risking a
    /// duplicate.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        groups: &[TemplateGroup],
        entries: &[CacheEntry],
        embeddings: &HashMap<String, Vec<f32>>,
        rng: &mut R,
    ) -> Resolution {
        let mut answers = Vec::with_capacity(groups.len());
        let mut residual_template = Vec::new();
        let mut residual_indices = Vec::with_capacity(groups.len());
        let mut stats = CacheStats::default();
        let mut included: Vec<&[f32]> = Vec::new();

        for group in groups {
            let mut hits = group.empty_answers();
            let mut missing = Vec::new();

            for (index, slot) in group.slots().iter().enumerate() {
                let picked = if group.is_cacheable() {
                    self.resolve_slot(group, slot, entries, embeddings, &mut included, rng)
                } else {
                    None
                };

                stats.record(picked.is_some());
                match picked {
                    Some(cached) => hits.push(Question::new(
                        slot.unit_name.clone(),
                        slot.objective.clone(),
                        cached.content.clone(),
                    )),
                    None => missing.push(index),
                }
            }

            if missing.is_empty() {
                residual_indices.push(None);
            } else {
                residual_template.push(group.select(&missing));
                residual_indices.push(Some(ResidualIndices {
                    question_type: group.question_type().to_string(),
                    indices: missing,
                }));
            }
            answers.push(hits);
        }

        debug!(
            total = stats.total_decisions,
            hits = stats.cache_hit_count,
            misses = stats.cache_miss_count,
            residual_groups = residual_template.len(),
            "Resolved template against cache"
        );

        Resolution {
            answers,
            residual_template,
            residual_indices,
            stats,
        }
    }

    fn resolve_slot<'a, R: Rng + ?Sized>(
        &self,
        group: &TemplateGroup,
        slot: &QuestionSlot,
        entries: &'a [CacheEntry],
        embeddings: &'a HashMap<String, Vec<f32>>,
        included: &mut Vec<&'a [f32]>,
        rng: &mut R,
    ) -> Option<&'a CachedQuestion> {
        let draw: f64 = rng.random();
        if draw >= self.cache_usage_rate {
            trace!(draw, rate = self.cache_usage_rate, "Forced cache miss");
            return None;
        }

        let mut queued: Vec<(&'a CachedQuestion, &'a [f32])> = Vec::new();

        for candidate in candidates(group, slot, entries) {
            let hash = hash_question_text(&candidate.content.searchable_text());
            let Some(vector) = embeddings.get(&hash).map(Vec::as_slice) else {
                debug!(
                    unit = %slot.unit_name,
                    objective = %slot.objective,
                    hash = %hash,
                    "Skipping cached question without embedding"
                );
                continue;
            };

            // Self-similarity doubles as the zero-vector guard.
            if cosine_similarity(vector, vector).is_err() {
                debug!(hash = %hash, "Skipping cached question with unusable embedding");
                continue;
            }

            let prior: Vec<&[f32]> = included
                .iter()
                .copied()
                .chain(queued.iter().map(|(_, v)| *v))
                .collect();
            if let Some((_, score)) = most_similar(&prior, vector) {
                if score > self.similarity_threshold {
                    trace!(score, "Excluding near-duplicate candidate");
                    continue;
                }
            }

            queued.push((candidate, vector));
        }

        let &(picked, vector) = queued.choose(rng)?;
        included.push(vector);
        Some(picked)
    }
}

/// Cached questions compatible with `slot`: same unit name (case-insensitive),
/// same objective, type, and marks.
fn candidates<'a, 's>(
    group: &'s TemplateGroup,
    slot: &'s QuestionSlot,
    entries: &'a [CacheEntry],
) -> impl Iterator<Item = &'a CachedQuestion> + 's
where
    'a: 's,
{
    entries
        .iter()
        .filter(move |entry| entry.unit_name.eq_ignore_ascii_case(&slot.unit_name))
        .flat_map(move |entry| entry.questions_for(&slot.objective))
        .filter(move |q| q.matches(group.question_type(), group.marks_per_question()))
}

/// Every embedding hash a resolution over `entries` could ask for.
pub fn candidate_hashes(entries: &[CacheEntry]) -> Vec<String> {
    let mut hashes: Vec<String> = entries
        .iter()
        .flat_map(|entry| entry.questions_by_objective.values().flatten())
        .map(|q| hash_question_text(&q.content.searchable_text()))
        .collect();
    hashes.sort_unstable();
    hashes.dedup();
    hashes
}

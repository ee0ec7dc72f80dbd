//! Cache document types.

use std::collections::BTreeMap;

use rkyv::Archive;
use serde::{Deserialize, Serialize};

use super::template::{QuestionContent, UnitLevel};
use crate::hashing::{hash_question_text, hash_unit_key};

/// Identity used for cache entry upserts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub unit_id: String,
    pub unit_name: String,
}

impl CacheKey {
    pub fn new(unit_id: impl Into<String>, unit_name: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            unit_name: unit_name.into(),
        }
    }

    /// Stable document id (see [`hash_unit_key`]).
    pub fn document_id(&self) -> String {
        hash_unit_key(&self.unit_id, &self.unit_name)
    }
}

/// A previously generated question available for reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedQuestion {
    pub question_type: String,
    pub marks_per_question: u32,
    pub content: QuestionContent,
    /// BLAKE3 hex digest of the normalized question text.
    pub embedding_hash: String,
}

impl CachedQuestion {
    /// Builds a cached question, deriving the embedding hash from its content.
    pub fn new(question_type: impl Into<String>, marks_per_question: u32, content: QuestionContent) -> Self {
        let embedding_hash = hash_question_text(&content.searchable_text());
        Self {
            question_type: question_type.into(),
            marks_per_question,
            content,
            embedding_hash,
        }
    }

    #[inline]
    pub fn matches(&self, question_type: &str, marks_per_question: u32) -> bool {
        self.question_type == question_type && self.marks_per_question == marks_per_question
    }
}

/// Cached questions for one unit, grouped by learning objective.
///
/// Questions are only ever appended; order within an objective carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub unit_id: String,
    pub unit_name: String,
    pub unit_level: UnitLevel,
    #[serde(default)]
    pub questions_by_objective: BTreeMap<String, Vec<CachedQuestion>>,
}

impl CacheEntry {
    pub fn new(unit_id: impl Into<String>, unit_name: impl Into<String>, unit_level: UnitLevel) -> Self {
        Self {
            unit_id: unit_id.into(),
            unit_name: unit_name.into(),
            unit_level,
            questions_by_objective: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.unit_id.clone(), self.unit_name.clone())
    }

    /// Questions cached under `objective` (empty slice if none).
    pub fn questions_for(&self, objective: &str) -> &[CachedQuestion] {
        self.questions_by_objective
            .get(objective)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Appends a question to `objective`, creating the list lazily.
    pub fn append(&mut self, objective: impl Into<String>, question: CachedQuestion) {
        self.questions_by_objective
            .entry(objective.into())
            .or_default()
            .push(question);
    }

    pub fn question_count(&self) -> usize {
        self.questions_by_objective.values().map(Vec::len).sum()
    }

    /// Every embedding hash referenced by this entry.
    pub fn embedding_hashes(&self) -> impl Iterator<Item = &str> {
        self.questions_by_objective
            .values()
            .flatten()
            .map(|q| q.embedding_hash.as_str())
    }
}

/// Content-addressed embedding vector. Write-once.
///
/// Persisted as `rkyv` bytes by the file store.
#[derive(Archive, rkyv::Serialize, rkyv::Deserialize, Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct EmbeddingRecord {
    pub hash: String,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn new(hash: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            hash: hash.into(),
            vector,
        }
    }
}

//! Test fixtures for integration tests.

use qbank::{
    CacheEntry, CacheStore, CachedQuestion, Embedder, EmbeddingRecord, GenerationRequest,
    QuestionContent, QuestionSlot, StubEmbedder, TemplateGroup, UnitLevel, hash_question_text,
    normalize_question_text,
};

pub const EMBEDDING_DIM: usize = 64;

pub const DEFAULT_UNIT_ID: &str = "unit-cells";

pub const DEFAULT_UNIT_NAME: &str = "Cells";

/// Builds a [`GenerationRequest`] one group at a time.
pub struct RequestBuilder {
    unit_level: UnitLevel,
    unit_id: String,
    unit_name: String,
    groups: Vec<TemplateGroup>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            unit_level: UnitLevel::Chapter,
            unit_id: DEFAULT_UNIT_ID.to_string(),
            unit_name: DEFAULT_UNIT_NAME.to_string(),
            groups: Vec::new(),
        }
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit_level(mut self, level: UnitLevel) -> Self {
        self.unit_level = level;
        self
    }

    pub fn unit(mut self, unit_id: &str, unit_name: &str) -> Self {
        self.unit_id = unit_id.to_string();
        self.unit_name = unit_name.to_string();
        self
    }

    /// Adds a group with one slot per objective, under the current unit.
    pub fn group(mut self, question_type: &str, marks: u32, objectives: &[&str]) -> Self {
        let slots = objectives
            .iter()
            .map(|o| QuestionSlot::new(self.unit_id.clone(), self.unit_name.clone(), *o))
            .collect();
        self.groups.push(TemplateGroup::new(question_type, marks, slots));
        self
    }

    pub fn build(self) -> GenerationRequest {
        GenerationRequest::new(self.unit_level, self.groups)
    }
}

/// Builds a [`CacheEntry`] with text questions.
pub struct CacheEntryBuilder {
    entry: CacheEntry,
}

impl Default for CacheEntryBuilder {
    fn default() -> Self {
        Self {
            entry: CacheEntry::new(DEFAULT_UNIT_ID, DEFAULT_UNIT_NAME, UnitLevel::Chapter),
        }
    }
}

impl CacheEntryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(mut self, unit_id: &str, unit_name: &str, level: UnitLevel) -> Self {
        self.entry = CacheEntry::new(unit_id, unit_name, level);
        self
    }

    pub fn question(mut self, objective: &str, question_type: &str, marks: u32, body: &str) -> Self {
        self.entry.append(
            objective,
            CachedQuestion::new(question_type, marks, QuestionContent::text(body)),
        );
        self
    }

    pub fn build(self) -> CacheEntry {
        self.entry
    }
}

/// Writes `entries` plus a stub embedding for every question they hold.
pub async fn seed_store<S: CacheStore>(store: &S, entries: Vec<CacheEntry>) {
    let embedder = StubEmbedder::new(EMBEDDING_DIM);
    let mut records = Vec::new();
    for entry in &entries {
        for question in entry.questions_by_objective.values().flatten() {
            let text = question.content.searchable_text();
            let vector = embedder
                .embed(&normalize_question_text(&text))
                .await
                .expect("stub embedding");
            records.push(EmbeddingRecord::new(hash_question_text(&text), vector));
        }
    }
    store
        .insert_embeddings(records)
        .await
        .expect("seed embeddings");
    store
        .upsert_cache_entries(entries)
        .await
        .expect("seed entries");
}

pub fn body_of(content: &QuestionContent) -> &str {
    match content {
        QuestionContent::Text { body, .. } => body,
        QuestionContent::Match { .. } => "<match>",
    }
}

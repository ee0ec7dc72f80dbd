//! Question bank cache and reconciliation engine.
//!
//! # Public API Surface
//!
//! ## Request path
//! - [`QuestionBank`], [`GenerationOutcome`], [`Reconciliation`] - Cache-aware generation
//! - [`CacheReader`], [`Resolution`], [`CacheStats`] - Hit/residual partitioning
//! - [`merge`], [`MergeOutcome`] - Positional splice of generated answers
//!
//! ## Reconciliation
//! - [`ReconcileQueue`], [`JobTicket`], [`JobOutcome`] - Single-writer background queue
//! - [`JobSummary`], [`JobLedger`] - Durable per-request job records
//! - [`CacheSkeleton`], [`ReconciliationJob`] - Placement plan and work item
//!
//! ## Storage
//! - [`CacheStore`] with [`MemoryStore`] and [`FileStore`] backends
//!
//! ## Seams
//! - [`QuestionGenerator`] - External generation service
//! - [`Embedder`], [`StubEmbedder`], [`NoModelEmbedder`] - Embedding model
//!
//! ## Test/Mock Support
//! [`MockGenerator`] is available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod config;
pub mod constants;
pub mod embedding;
pub mod engine;
pub mod generator;
pub mod hashing;
pub mod ledger;
pub mod merge;
pub mod model;
pub mod reader;
pub mod reconcile;
pub mod similarity;
pub mod storage;

pub use config::{Config, ConfigError};
pub use constants::{DimConfig, DimValidationError, validate_embedding_dim};
pub use embedding::{Embedder, EmbeddingError, NoModelEmbedder, StubEmbedder};
pub use engine::{EngineError, EngineResult, GenerationOutcome, QuestionBank, Reconciliation};
#[cfg(any(test, feature = "mock"))]
pub use generator::MockGenerator;
pub use generator::{GeneratorError, GeneratorResult, QuestionGenerator};
pub use hashing::{hash_question_text, hash_to_u64, hash_unit_key, normalize_question_text};
pub use ledger::{JobLedger, JobSummary};
pub use merge::{GroupMergeError, MergeError, MergeOutcome, MergeResult, merge};
pub use model::{
    AnswerGroup, CacheEntry, CacheKey, CachedQuestion, EmbeddingRecord, GenerationRequest,
    Question, QuestionContent, QuestionSlot, SlotGroup, TemplateGroup, UnitLevel,
};
pub use reader::{CacheReader, CacheStats, Resolution, ResidualIndices};
pub use reconcile::{
    CacheSkeleton, JobOutcome, JobTicket, QueueError, QueueSettings, ReconcileQueue,
    ReconciliationJob, RetryOutcome, RetryReport,
};
pub use similarity::{SimilarityError, cosine_similarity, most_similar};
pub use storage::{CacheStore, FileStore, MemoryStore, StoreError, StoreResult, WriteEvent};

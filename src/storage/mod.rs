//! Persistence for cache entries, embedding records and job summaries.
//!
//! [`CacheStore`] and [`JobLedger`](crate::ledger::JobLedger) are the seams. Two backends
//! implement both: [`MemoryStore`] (in-process, records write order) and [`FileStore`]
//! (one JSON document per entry/job, one rkyv file per embedding).

pub mod error;
pub mod file;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::{MemoryStore, WriteEvent};

use std::future::Future;

use crate::model::{CacheEntry, EmbeddingRecord, UnitLevel};

/// Document store for cache entries and the embedding table.
pub trait CacheStore: Send + Sync {
    /// Entries at `unit_level` whose unit id is in `unit_ids` or whose unit name matches
    /// one of `unit_names` case-insensitively.
    fn find_matching(
        &self,
        unit_ids: &[String],
        unit_level: UnitLevel,
        unit_names: &[String],
    ) -> impl Future<Output = StoreResult<Vec<CacheEntry>>> + Send;

    /// Inserts or replaces entries keyed by `(unit_id, unit_name)`.
    fn upsert_cache_entries(
        &self,
        entries: Vec<CacheEntry>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Records for the hashes that exist. Unknown hashes are absent from the result.
    fn get_embeddings(
        &self,
        hashes: &[String],
    ) -> impl Future<Output = StoreResult<Vec<EmbeddingRecord>>> + Send;

    /// Write-once insert. Returns how many records were new.
    fn insert_embeddings(
        &self,
        records: Vec<EmbeddingRecord>,
    ) -> impl Future<Output = StoreResult<usize>> + Send;
}

pub(crate) fn entry_matches(
    entry: &CacheEntry,
    unit_ids: &[String],
    unit_level: UnitLevel,
    unit_names: &[String],
) -> bool {
    entry.unit_level == unit_level
        && (unit_ids.iter().any(|id| *id == entry.unit_id)
            || unit_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&entry.unit_name)))
}

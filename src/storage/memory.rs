//! In-process store used by tests and embedded deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::{CacheStore, StoreError, StoreResult, entry_matches};
use crate::ledger::{JobLedger, JobSummary};
use crate::model::{CacheEntry, EmbeddingRecord, UnitLevel};

/// One successful cache-side write, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEvent {
    Embeddings { hashes: Vec<String> },
    CacheEntries { document_ids: Vec<String> },
}

#[derive(Default)]
struct Inner {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
    embeddings: RwLock<HashMap<String, Vec<f32>>>,
    jobs: RwLock<HashMap<Uuid, JobSummary>>,
    write_log: Mutex<Vec<WriteEvent>>,
    failing_writes: AtomicUsize,
    failing_completions: AtomicUsize,
}

/// Cloneable handle; clones share state.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn embedding_count(&self) -> usize {
        self.inner.embeddings.read().len()
    }

    pub fn entries(&self) -> Vec<CacheEntry> {
        self.inner.entries.read().values().cloned().collect()
    }

    pub fn write_log(&self) -> Vec<WriteEvent> {
        self.inner.write_log.lock().clone()
    }

    /// Makes the next `count` cache-side writes fail.
    #[cfg(any(test, feature = "mock"))]
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` saves of a reconciled summary fail.
    #[cfg(any(test, feature = "mock"))]
    pub fn fail_next_completions(&self, count: usize) {
        self.inner.failing_completions.store(count, Ordering::SeqCst);
    }

    fn check_write(&self) -> StoreResult<()> {
        take_injected(&self.inner.failing_writes)
    }
}

fn take_injected(counter: &AtomicUsize) -> StoreResult<()> {
    match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
        Ok(_) => Err(StoreError::WriteFailed("injected failure".to_string())),
        Err(_) => Ok(()),
    }
}

impl CacheStore for MemoryStore {
    async fn find_matching(
        &self,
        unit_ids: &[String],
        unit_level: UnitLevel,
        unit_names: &[String],
    ) -> StoreResult<Vec<CacheEntry>> {
        Ok(self
            .inner
            .entries
            .read()
            .values()
            .filter(|e| entry_matches(e, unit_ids, unit_level, unit_names))
            .cloned()
            .collect())
    }

    async fn upsert_cache_entries(&self, entries: Vec<CacheEntry>) -> StoreResult<()> {
        self.check_write()?;

        let mut document_ids = Vec::with_capacity(entries.len());
        {
            let mut map = self.inner.entries.write();
            for entry in entries {
                let id = entry.key().document_id();
                document_ids.push(id.clone());
                map.insert(id, entry);
            }
        }
        self.inner
            .write_log
            .lock()
            .push(WriteEvent::CacheEntries { document_ids });
        Ok(())
    }

    async fn get_embeddings(&self, hashes: &[String]) -> StoreResult<Vec<EmbeddingRecord>> {
        let map = self.inner.embeddings.read();
        Ok(hashes
            .iter()
            .filter_map(|h| map.get(h).map(|v| EmbeddingRecord::new(h.clone(), v.clone())))
            .collect())
    }

    async fn insert_embeddings(&self, records: Vec<EmbeddingRecord>) -> StoreResult<usize> {
        self.check_write()?;

        let mut hashes = Vec::new();
        {
            let mut map = self.inner.embeddings.write();
            for record in records {
                if !map.contains_key(&record.hash) {
                    hashes.push(record.hash.clone());
                    map.insert(record.hash, record.vector);
                }
            }
        }
        let written = hashes.len();
        self.inner
            .write_log
            .lock()
            .push(WriteEvent::Embeddings { hashes });
        Ok(written)
    }
}

impl JobLedger for MemoryStore {
    async fn create_job(&self, job: JobSummary) -> StoreResult<()> {
        let mut jobs = self.inner.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(StoreError::JobExists { id: job.id });
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<JobSummary>> {
        Ok(self.inner.jobs.read().get(&id).cloned())
    }

    async fn save_job(&self, job: JobSummary) -> StoreResult<()> {
        if job.is_cache_updated {
            take_injected(&self.inner.failing_completions)?;
        }
        let mut jobs = self.inner.jobs.write();
        if !jobs.contains_key(&job.id) {
            return Err(StoreError::JobNotFound { id: job.id });
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn list_jobs(&self) -> StoreResult<Vec<JobSummary>> {
        let mut jobs: Vec<JobSummary> = self.inner.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

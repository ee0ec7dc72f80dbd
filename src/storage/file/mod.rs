//! File-backed store (one document per file).
//!
//! Layout under the root:
//!
//! ```text
//! entries/<document_id>.json
//! embeddings/<hash>.rkyv
//! jobs/<job_id>.json
//! ```
//!
//! Every write goes to a sibling temp file first and is renamed into place, so readers
//! never observe a torn document.


use std::path::{Path, PathBuf};
use std::sync::Arc;

use moka::sync::Cache;
use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CacheStore, StoreError, StoreResult, entry_matches};
use crate::ledger::{JobLedger, JobSummary};
use crate::model::{CacheEntry, EmbeddingRecord, UnitLevel};

const ENTRIES_DIR: &str = "entries";
const EMBEDDINGS_DIR: &str = "embeddings";
const JOBS_DIR: &str = "jobs";

const JSON_EXTENSION: &str = "json";
const RKYV_EXTENSION: &str = "rkyv";
const TEMP_SUFFIX: &str = "tmp";

/// Embeddings kept in memory after first read.
const EMBEDDING_CACHE_CAPACITY: u64 = 10_000;

#[derive(Clone)]
/// Stores cache entries, embeddings and job summaries under one directory.
pub struct FileStore {
    root: PathBuf,
    embedding_cache: Cache<String, Arc<Vec<f32>>>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .field("cached_embeddings", &self.embedding_cache.entry_count())
            .finish()
    }
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in [ENTRIES_DIR, EMBEDDINGS_DIR, JOBS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|_| StoreError::StorageUnavailable { path })?;
        }

        Ok(Self {
            root,
            embedding_cache: Cache::new(EMBEDDING_CACHE_CAPACITY),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, document_id: &str) -> PathBuf {
        self.root
            .join(ENTRIES_DIR)
            .join(format!("{document_id}.{JSON_EXTENSION}"))
    }

    fn embedding_path(&self, hash: &str) -> StoreResult<PathBuf> {
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidKey {
                key: hash.to_string(),
            });
        }
        Ok(self
            .root
            .join(EMBEDDINGS_DIR)
            .join(format!("{hash}.{RKYV_EXTENSION}")))
    }

    fn job_path(&self, id: Uuid) -> PathBuf {
        self.root
            .join(JOBS_DIR)
            .join(format!("{id}.{JSON_EXTENSION}"))
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let temp_path = path.with_extension(format!("{}.{TEMP_SUFFIX}", Uuid::new_v4().simple()));

        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        Self::write_atomic(path, &bytes).await
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Parses every JSON document in `dir`. Unreadable documents are logged and skipped.
    async fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        let mut listing = fs::read_dir(dir).await?;
        while let Some(item) = listing.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JSON_EXTENSION) {
                continue;
            }
            match Self::read_json::<T>(&path).await {
                Ok(Some(doc)) => out.push(doc),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }
        Ok(out)
    }

    async fn load_embedding(&self, hash: &str) -> StoreResult<Option<Arc<Vec<f32>>>> {
        if let Some(vector) = self.embedding_cache.get(hash) {
            return Ok(Some(vector));
        }

        let path = self.embedding_path(hash)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(&bytes);
        let record = rkyv::from_bytes::<EmbeddingRecord, RkyvError>(&aligned)
            .map_err(|e| StoreError::Serialization(format!("{:?}", e)))?;

        let vector = Arc::new(record.vector);
        self.embedding_cache
            .insert(hash.to_string(), Arc::clone(&vector));
        Ok(Some(vector))
    }
}

impl CacheStore for FileStore {
    async fn find_matching(
        &self,
        unit_ids: &[String],
        unit_level: UnitLevel,
        unit_names: &[String],
    ) -> StoreResult<Vec<CacheEntry>> {
        let all: Vec<CacheEntry> = Self::read_json_dir(&self.root.join(ENTRIES_DIR)).await?;
        let mut matching: Vec<CacheEntry> = all
            .into_iter()
            .filter(|e| entry_matches(e, unit_ids, unit_level, unit_names))
            .collect();
        matching.sort_by_key(|e| e.key().document_id());
        Ok(matching)
    }

    async fn upsert_cache_entries(&self, entries: Vec<CacheEntry>) -> StoreResult<()> {
        for entry in &entries {
            let path = self.entry_path(&entry.key().document_id());
            Self::write_json(&path, entry).await?;
        }
        debug!(count = entries.len(), "Upserted cache entries");
        Ok(())
    }

    async fn get_embeddings(&self, hashes: &[String]) -> StoreResult<Vec<EmbeddingRecord>> {
        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(vector) = self.load_embedding(hash).await? {
                out.push(EmbeddingRecord::new(hash.clone(), vector.as_ref().clone()));
            }
        }
        Ok(out)
    }

    async fn insert_embeddings(&self, records: Vec<EmbeddingRecord>) -> StoreResult<usize> {
        let mut written = 0;
        for record in records {
            let path = self.embedding_path(&record.hash)?;
            if fs::try_exists(&path).await? {
                continue;
            }

            let bytes = rkyv::to_bytes::<RkyvError>(&record)
                .map_err(|e| StoreError::Serialization(format!("{:?}", e)))?;
            Self::write_atomic(&path, &bytes).await?;
            self.embedding_cache
                .insert(record.hash, Arc::new(record.vector));
            written += 1;
        }
        debug!(written, "Inserted embedding records");
        Ok(written)
    }
}

impl JobLedger for FileStore {
    async fn create_job(&self, job: JobSummary) -> StoreResult<()> {
        let path = self.job_path(job.id);
        if fs::try_exists(&path).await? {
            return Err(StoreError::JobExists { id: job.id });
        }
        Self::write_json(&path, &job).await
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<JobSummary>> {
        Self::read_json(&self.job_path(id)).await
    }

    async fn save_job(&self, job: JobSummary) -> StoreResult<()> {
        let path = self.job_path(job.id);
        if !fs::try_exists(&path).await? {
            return Err(StoreError::JobNotFound { id: job.id });
        }
        Self::write_json(&path, &job).await
    }

    async fn list_jobs(&self) -> StoreResult<Vec<JobSummary>> {
        let mut jobs: Vec<JobSummary> = Self::read_json_dir(&self.root.join(JOBS_DIR)).await?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

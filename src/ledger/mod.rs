//! Durable per-request job records.
//!
//! Every request that reaches the cache leaves a [`JobSummary`]. Requests that needed
//! generation carry the residual template, the cache skeleton and the generated answers
//! until reconciliation succeeds; those fields are cleared on completion.


use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AnswerGroup, TemplateGroup, UnitLevel};
use crate::reader::CacheStats;
use crate::reconcile::CacheSkeleton;
use crate::storage::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Audit and recovery record for one generation request.
pub struct JobSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub unit_level: UnitLevel,
    pub total_slots: usize,
    pub cache_hit_count: usize,
    pub cache_miss_count: usize,
    #[serde(default)]
    pub residual_template: Option<Vec<TemplateGroup>>,
    #[serde(default)]
    pub processed_cache_skeleton: Option<CacheSkeleton>,
    #[serde(default)]
    pub newly_generated_answers: Option<Vec<AnswerGroup>>,
    pub is_cache_updated: bool,
    pub in_progress: bool,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl JobSummary {
    /// A request whose generated content still has to be written back.
    pub fn pending(
        unit_level: UnitLevel,
        stats: &CacheStats,
        residual_template: Vec<TemplateGroup>,
        skeleton: CacheSkeleton,
        newly_generated_answers: Vec<AnswerGroup>,
    ) -> Self {
        Self {
            residual_template: Some(residual_template),
            processed_cache_skeleton: Some(skeleton),
            newly_generated_answers: Some(newly_generated_answers),
            ..Self::base(unit_level, stats, false)
        }
    }

    /// A request served entirely from cache. Nothing is left to reconcile.
    pub fn reconciled(unit_level: UnitLevel, stats: &CacheStats) -> Self {
        let mut summary = Self::base(unit_level, stats, true);
        summary.completed_at = Some(summary.created_at);
        summary
    }

    fn base(unit_level: UnitLevel, stats: &CacheStats, is_cache_updated: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            unit_level,
            total_slots: stats.total_decisions,
            cache_hit_count: stats.cache_hit_count,
            cache_miss_count: stats.cache_miss_count,
            residual_template: None,
            processed_cache_skeleton: None,
            newly_generated_answers: None,
            is_cache_updated,
            in_progress: false,
            attempts: 0,
            last_error: None,
        }
    }

    /// Not reconciled and not held by a worker. The payload may still be missing,
    /// see [`JobSummary::has_payload`].
    pub fn is_retryable(&self) -> bool {
        !self.is_cache_updated && !self.in_progress
    }

    pub fn has_payload(&self) -> bool {
        self.processed_cache_skeleton.is_some() && self.newly_generated_answers.is_some()
    }

    /// In progress for longer than `bound` as of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, bound: Duration) -> bool {
        match (self.in_progress, self.started_at) {
            (true, Some(started)) => (now - started)
                .to_std()
                .map(|elapsed| elapsed > bound)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn begin(&mut self) {
        self.in_progress = true;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    pub fn complete(&mut self) {
        self.in_progress = false;
        self.is_cache_updated = true;
        self.completed_at = Some(Utc::now());
        self.last_error = None;
        self.residual_template = None;
        self.processed_cache_skeleton = None;
        self.newly_generated_answers = None;
    }

    /// Releases the job with its payload intact so it can be retried.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.in_progress = false;
        self.last_error = Some(error.into());
    }
}

/// Durable store of [`JobSummary`] records.
///
/// Implementors provide the four primitives; the state transitions are shared.
pub trait JobLedger: Send + Sync {
    /// Records a new summary. Fails if the id is already present.
    fn create_job(&self, job: JobSummary) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_job(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<JobSummary>>> + Send;

    /// Overwrites an existing summary.
    fn save_job(&self, job: JobSummary) -> impl Future<Output = StoreResult<()>> + Send;

    /// All summaries, oldest first.
    fn list_jobs(&self) -> impl Future<Output = StoreResult<Vec<JobSummary>>> + Send;

    /// Claims the job for a worker and returns the updated summary.
    fn mark_in_progress(&self, id: Uuid) -> impl Future<Output = StoreResult<JobSummary>> + Send {
        async move {
            let mut job = self
                .get_job(id)
                .await?
                .ok_or(StoreError::JobNotFound { id })?;
            job.begin();
            self.save_job(job.clone()).await?;
            Ok(job)
        }
    }

    fn mark_completed(&self, id: Uuid) -> impl Future<Output = StoreResult<JobSummary>> + Send {
        async move {
            let mut job = self
                .get_job(id)
                .await?
                .ok_or(StoreError::JobNotFound { id })?;
            job.complete();
            self.save_job(job.clone()).await?;
            Ok(job)
        }
    }

    fn mark_failed(
        &self,
        id: Uuid,
        error: String,
    ) -> impl Future<Output = StoreResult<JobSummary>> + Send {
        async move {
            let mut job = self
                .get_job(id)
                .await?
                .ok_or(StoreError::JobNotFound { id })?;
            job.fail(error);
            self.save_job(job.clone()).await?;
            Ok(job)
        }
    }

    fn list_retryable(&self) -> impl Future<Output = StoreResult<Vec<JobSummary>>> + Send {
        async move {
            Ok(self
                .list_jobs()
                .await?
                .into_iter()
                .filter(JobSummary::is_retryable)
                .collect())
        }
    }

    fn list_in_progress(&self) -> impl Future<Output = StoreResult<Vec<JobSummary>>> + Send {
        async move {
            Ok(self
                .list_jobs()
                .await?
                .into_iter()
                .filter(|job| job.in_progress)
                .collect())
        }
    }
}

//! Request-path orchestration.
//!
//! ```text
//! find_matching -> prefetch embeddings -> resolve -> generate residual
//!   -> merge -> record JobSummary -> submit ReconciliationJob
//! ```
//!
//! The request path never writes to the cache. Only the reconciliation worker does.

mod error;

#[cfg(test)]
mod tests;

pub use error::{EngineError, EngineResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::generator::{GeneratorError, QuestionGenerator};
use crate::ledger::{JobLedger, JobSummary};
use crate::merge::merge;
use crate::model::{AnswerGroup, GenerationRequest};
use crate::reader::{CacheReader, CacheStats, candidate_hashes};
use crate::reconcile::{
    CacheSkeleton, JobTicket, QueueError, QueueResult, QueueSettings, ReconcileQueue,
    ReconciliationJob,
};
use crate::storage::CacheStore;

/// What happened to the cache-side follow-up of a request.
#[derive(Debug)]
pub enum Reconciliation {
    /// Every slot came from cache.
    NotNeeded,
    /// A job was queued. Waiting on the ticket is optional.
    Queued(JobTicket),
    /// The queue refused the job. The summary stays retryable.
    Deferred(QueueError),
}

/// Response to [`QuestionBank::generate`].
#[derive(Debug)]
pub struct GenerationOutcome {
    /// One group per request group, in the original slot order.
    pub answers: Vec<AnswerGroup>,
    pub job_id: Uuid,
    pub stats: CacheStats,
    pub reconciliation: Reconciliation,
}

/// Cache-aware question generation service.
pub struct QuestionBank<S> {
    store: Arc<S>,
    generator: Arc<dyn QuestionGenerator>,
    queue: ReconcileQueue<S>,
    reader: CacheReader,
    rng_seed: Option<u64>,
    request_counter: AtomicU64,
}

impl<S> QuestionBank<S>
where
    S: CacheStore + JobLedger + 'static,
{
    pub fn new(
        store: Arc<S>,
        generator: Arc<dyn QuestionGenerator>,
        queue: ReconcileQueue<S>,
        reader: CacheReader,
    ) -> Self {
        Self {
            store,
            generator,
            queue,
            reader,
            rng_seed: None,
            request_counter: AtomicU64::new(0),
        }
    }

    /// Seeds request `n` with `seed + n`, making every sampling decision replayable.
    pub fn with_rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Starts the reconciliation worker and wires it to a new service.
    pub async fn from_config(
        config: &Config,
        store: Arc<S>,
        generator: Arc<dyn QuestionGenerator>,
        embedder: Arc<dyn Embedder>,
    ) -> QueueResult<(Self, JoinHandle<()>)> {
        let (queue, handle) = ReconcileQueue::start(
            Arc::clone(&store),
            embedder,
            QueueSettings::from_config(config),
        )
        .await?;
        let reader = CacheReader::new(config.cache_usage_rate, config.similarity_threshold);
        let bank = Self::new(store, generator, queue, reader).with_rng_seed(config.rng_seed);
        Ok((bank, handle))
    }

    pub fn queue(&self) -> &ReconcileQueue<S> {
        &self.queue
    }

    pub fn reader(&self) -> &CacheReader {
        &self.reader
    }

    fn next_rng(&self) -> StdRng {
        let n = self.request_counter.fetch_add(1, Ordering::Relaxed);
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(n)),
            None => StdRng::from_os_rng(),
        }
    }

    #[instrument(
        skip(self, request),
        fields(unit_level = %request.unit_level, groups = request.groups.len(), slots = request.total_slots())
    )]
    pub async fn generate(&self, request: &GenerationRequest) -> EngineResult<GenerationOutcome> {
        let entries = self
            .store
            .find_matching(&request.unit_ids(), request.unit_level, &request.unit_names())
            .await
            .map_err(EngineError::Lookup)?;

        let hashes = candidate_hashes(&entries);
        let embeddings: HashMap<String, Vec<f32>> = match self.store.get_embeddings(&hashes).await {
            Ok(records) => records.into_iter().map(|r| (r.hash, r.vector)).collect(),
            Err(e) => {
                warn!(error = %e, candidates = hashes.len(), "Embedding prefetch failed, treating candidates as misses");
                HashMap::new()
            }
        };

        let resolution = {
            let mut rng = self.next_rng();
            self.reader
                .resolve(&request.groups, &entries, &embeddings, &mut rng)
        };
        let stats = resolution.stats;
        debug!(
            hits = stats.cache_hit_count,
            misses = stats.cache_miss_count,
            entries = entries.len(),
            "Cache resolution complete"
        );

        if resolution.is_fully_cached() {
            let summary = JobSummary::reconciled(request.unit_level, &stats);
            let job_id = summary.id;
            self.store
                .create_job(summary)
                .await
                .map_err(EngineError::Ledger)?;
            info!(job_id = %job_id, hits = stats.cache_hit_count, "Request served from cache");
            return Ok(GenerationOutcome {
                answers: resolution.answers,
                job_id,
                stats,
                reconciliation: Reconciliation::NotNeeded,
            });
        }

        let generated = self
            .generator
            .generate(&resolution.residual_template, &resolution.answers)
            .await?;
        if generated.len() != resolution.residual_template.len() {
            return Err(GeneratorError::ShapeMismatch {
                expected: resolution.residual_template.len(),
                actual: generated.len(),
            }
            .into());
        }

        let merged = merge(resolution.answers, &generated, &resolution.residual_indices)?;
        if !merged.is_clean() {
            warn!(skipped = merged.skipped.len(), "Some generated groups were not merged");
        }

        let skeleton = CacheSkeleton::from_residual(request.unit_level, &resolution.residual_template);
        let summary = JobSummary::pending(
            request.unit_level,
            &stats,
            resolution.residual_template,
            skeleton,
            generated,
        );
        let job_id = summary.id;
        let job = ReconciliationJob::from_summary(&summary);
        self.store
            .create_job(summary)
            .await
            .map_err(EngineError::Ledger)?;

        let reconciliation = match job.map(|job| self.queue.submit(job)) {
            Some(Ok(ticket)) => Reconciliation::Queued(ticket),
            Some(Err(e)) => Reconciliation::Deferred(e),
            None => Reconciliation::NotNeeded,
        };

        info!(
            job_id = %job_id,
            hits = stats.cache_hit_count,
            misses = stats.cache_miss_count,
            "Request generated"
        );

        Ok(GenerationOutcome {
            answers: merged.groups,
            job_id,
            stats,
            reconciliation,
        })
    }
}

//! The single reconciliation consumer.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::queue::{JobOutcome, QueueSettings};
use super::{ReconcileError, ReconciliationJob};
use crate::constants::validate_embedding_dim;
use crate::embedding::{Embedder, EmbeddingError};
use crate::ledger::JobLedger;
use crate::model::EmbeddingRecord;
use crate::storage::{CacheStore, StoreResult};

/// `last_error` recorded for jobs a previous process left in progress.
pub(super) const ABANDONED: &str = "abandoned by a previous worker";

pub(super) struct Envelope {
    pub job: ReconciliationJob,
    pub reply: oneshot::Sender<JobOutcome>,
}

/// Counts reported by a successful reconciliation.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct AppliedCounts {
    pub questions_appended: usize,
    pub embeddings_written: usize,
    pub entries_written: usize,
    pub groups_skipped: usize,
}

pub(super) fn spawn_worker<S>(
    store: Arc<S>,
    embedder: Arc<dyn Embedder>,
    settings: QueueSettings,
    mut rx: mpsc::Receiver<Envelope>,
) -> JoinHandle<()>
where
    S: CacheStore + JobLedger + 'static,
{
    tokio::spawn(async move {
        while let Some(Envelope { job, reply }) = rx.recv().await {
            let job_id = job.job_id;
            let outcome = process(store.as_ref(), embedder.as_ref(), &settings, job).await;
            debug!(job_id = %job_id, outcome = ?outcome, "Reconciliation job finished");
            // Caller may have dropped the ticket.
            let _ = reply.send(outcome);
        }
        info!("Reconciliation queue closed, worker exiting");
    })
}

async fn process<S>(
    store: &S,
    embedder: &dyn Embedder,
    settings: &QueueSettings,
    job: ReconciliationJob,
) -> JobOutcome
where
    S: CacheStore + JobLedger,
{
    let job_id = job.job_id;

    match store.get_job(job_id).await {
        Ok(Some(summary)) if summary.is_cache_updated => {
            debug!(job_id = %job_id, "Job already reconciled, skipping");
            return JobOutcome::AlreadyReconciled;
        }
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(job_id = %job_id, "No job summary for submitted job");
            return JobOutcome::Failed {
                error: format!("job summary {job_id} not found"),
            };
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to load job summary");
            return JobOutcome::Failed {
                error: e.to_string(),
            };
        }
    }

    let summary = match store.mark_in_progress(job_id).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to claim job");
            return JobOutcome::Failed {
                error: e.to_string(),
            };
        }
    };

    let started = Instant::now();
    let result = run_with_limits(job_id, settings, reconcile(store, embedder, &job)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(counts) => match store.mark_completed(job_id).await {
            Ok(_) => {
                info!(
                    job_id = %job_id,
                    attempt = summary.attempts,
                    elapsed_ms,
                    appended = counts.questions_appended,
                    embeddings = counts.embeddings_written,
                    entries = counts.entries_written,
                    skipped_groups = counts.groups_skipped,
                    "Reconciliation job completed"
                );
                JobOutcome::Completed {
                    questions_appended: counts.questions_appended,
                    embeddings_written: counts.embeddings_written,
                    groups_skipped: counts.groups_skipped,
                }
            }
            Err(e) => {
                // Replaying an applied job only finds existing hashes.
                error!(job_id = %job_id, error = %e, "Cache updated but job could not be marked complete");
                release(store, job_id, format!("completion not recorded: {e}")).await
            }
        },
        Err(e) => {
            warn!(job_id = %job_id, attempt = summary.attempts, elapsed_ms, error = %e, "Reconciliation job failed");
            release(store, job_id, e.to_string()).await
        }
    }
}

/// Hands the job back to the retry scan with its payload intact.
async fn release<S: JobLedger>(store: &S, job_id: Uuid, error: String) -> JobOutcome {
    if let Err(ledger_err) = store.mark_failed(job_id, error.clone()).await {
        error!(job_id = %job_id, error = %ledger_err, "Failed to record job failure");
    }
    JobOutcome::Failed { error }
}

/// Releases every summary still marked in progress.
///
/// Only valid before the consumer starts: with a single worker, anything in progress
/// at that point was abandoned by a previous process.
pub(super) async fn release_abandoned<S: JobLedger>(store: &S) -> StoreResult<Vec<Uuid>> {
    let mut released = Vec::new();
    for summary in store.list_in_progress().await? {
        match store.mark_failed(summary.id, ABANDONED.to_string()).await {
            Ok(_) => {
                warn!(job_id = %summary.id, attempts = summary.attempts, "Released abandoned reconciliation job");
                released.push(summary.id);
            }
            Err(e) => error!(job_id = %summary.id, error = %e, "Failed to release abandoned job"),
        }
    }
    Ok(released)
}

/// Applies the optional timeout and warns once when the job outlives the stale bound.
async fn run_with_limits<F>(
    job_id: Uuid,
    settings: &QueueSettings,
    work: F,
) -> Result<AppliedCounts, ReconcileError>
where
    F: Future<Output = Result<AppliedCounts, ReconcileError>>,
{
    let stale_after = settings.stale_job_after;
    let watched = async move {
        let mut work = std::pin::pin!(work);
        tokio::select! {
            result = &mut work => result,
            _ = tokio::time::sleep(stale_after) => {
                warn!(job_id = %job_id, stale_after_secs = stale_after.as_secs(), "Reconciliation job is stale");
                work.await
            }
        }
    };

    match settings.job_timeout {
        Some(limit) => tokio::time::timeout(limit, watched)
            .await
            .unwrap_or(Err(ReconcileError::TimedOut { limit })),
        None => watched.await,
    }
}

async fn reconcile<S>(
    store: &S,
    embedder: &dyn Embedder,
    job: &ReconciliationJob,
) -> Result<AppliedCounts, ReconcileError>
where
    S: CacheStore,
{
    let skeleton = &job.processed_cache_skeleton;
    let current = store
        .find_matching(&skeleton.unit_ids(), skeleton.unit_level, &skeleton.unit_names())
        .await?;

    let plan = skeleton.apply(current, &job.newly_generated_answers)?;
    let groups_skipped = plan.skipped.len();
    if plan.is_empty() {
        debug!(job_id = %job.job_id, "Nothing new to cache");
        return Ok(AppliedCounts {
            groups_skipped,
            ..AppliedCounts::default()
        });
    }

    let known: HashSet<String> = store
        .get_embeddings(&plan.hashes())
        .await?
        .into_iter()
        .map(|r| r.hash)
        .collect();
    let pending: Vec<_> = plan
        .embeddings
        .iter()
        .filter(|p| !known.contains(&p.hash))
        .collect();

    let texts: Vec<String> = pending.iter().map(|p| p.normalized_text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbeddingError::InferenceFailed {
            reason: format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
        }
        .into());
    }

    let expected_dim = embedder.embedding_dim();
    let mut records = Vec::with_capacity(vectors.len());
    for (pending, vector) in pending.into_iter().zip(vectors) {
        validate_embedding_dim(vector.len(), expected_dim).map_err(EmbeddingError::from)?;
        records.push(EmbeddingRecord::new(pending.hash.clone(), vector));
    }

    // Embeddings land before the entries that reference them.
    let embeddings_written = store.insert_embeddings(records).await?;
    let entries_written = plan.entries.len();
    store.upsert_cache_entries(plan.entries).await?;

    Ok(AppliedCounts {
        questions_appended: plan.appended,
        embeddings_written,
        entries_written,
        groups_skipped,
    })
}

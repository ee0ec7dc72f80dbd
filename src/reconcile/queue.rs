//! Submission handle and retry surface for the reconciliation worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::worker::{Envelope, release_abandoned, spawn_worker};
use super::{QueueError, QueueResult, ReconciliationJob};
use crate::config::Config;
use crate::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_STALE_JOB_SECS};
use crate::embedding::Embedder;
use crate::ledger::{JobLedger, JobSummary};
use crate::storage::CacheStore;

/// How a submitted job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        questions_appended: usize,
        embeddings_written: usize,
        groups_skipped: usize,
    },
    /// A previous run already reconciled this job.
    AlreadyReconciled,
    Failed {
        error: String,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, JobOutcome::Failed { .. })
    }
}

/// Handle to a submitted job. Dropping it does not cancel the job.
#[derive(Debug)]
pub struct JobTicket {
    pub job_id: Uuid,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobTicket {
    /// Waits for the worker. `None` if the worker stopped before reaching the job.
    pub async fn wait(self) -> Option<JobOutcome> {
        self.rx.await.ok()
    }
}

#[derive(Debug)]
pub enum RetryOutcome {
    Submitted(JobTicket),
    /// The job is held by the worker; nothing was submitted.
    AlreadyInProgress,
    AlreadyReconciled,
    NotFound,
    /// The summary lost its payload and cannot be replayed.
    MissingPayload,
}

/// Result of a [`ReconcileQueue::retry_failed`] scan.
#[derive(Debug, Default)]
pub struct RetryReport {
    pub scanned: usize,
    pub submitted: Vec<JobTicket>,
    pub rejected: Vec<(Uuid, QueueError)>,
    pub missing_payload: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueSettings {
    pub capacity: usize,
    pub job_timeout: Option<Duration>,
    pub stale_job_after: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            job_timeout: None,
            stale_job_after: Duration::from_secs(DEFAULT_STALE_JOB_SECS),
        }
    }
}

impl QueueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.queue_capacity.max(1),
            job_timeout: config.job_timeout,
            stale_job_after: config.stale_job_after,
        }
    }
}

/// Cloneable sender side of the reconciliation queue.
pub struct ReconcileQueue<S> {
    tx: mpsc::Sender<Envelope>,
    ledger: Arc<S>,
    stale_job_after: Duration,
}

impl<S> Clone for ReconcileQueue<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            ledger: Arc::clone(&self.ledger),
            stale_job_after: self.stale_job_after,
        }
    }
}

impl<S> ReconcileQueue<S>
where
    S: CacheStore + JobLedger + 'static,
{
    /// Spawns the worker. The worker exits once every queue handle is dropped.
    ///
    /// The queue is the only consumer of `store`'s ledger, so summaries still marked in
    /// progress are released as failed before the worker starts.
    pub async fn start(
        store: Arc<S>,
        embedder: Arc<dyn Embedder>,
        settings: QueueSettings,
    ) -> QueueResult<(Self, JoinHandle<()>)> {
        let released = release_abandoned(store.as_ref()).await?;

        let (tx, rx) = mpsc::channel(settings.capacity.max(1));
        let handle = spawn_worker(Arc::clone(&store), embedder, settings, rx);
        info!(
            capacity = settings.capacity,
            timeout_secs = settings.job_timeout.map(|d| d.as_secs()),
            released = released.len(),
            "Reconciliation queue started"
        );
        Ok((
            Self {
                tx,
                ledger: store,
                stale_job_after: settings.stale_job_after,
            },
            handle,
        ))
    }

    /// Enqueues without waiting. The job's summary stays retryable on error.
    pub fn submit(&self, job: ReconciliationJob) -> QueueResult<JobTicket> {
        let job_id = job.job_id;
        let (reply, rx) = oneshot::channel();

        match self.tx.try_send(Envelope { job, reply }) {
            Ok(()) => Ok(JobTicket { job_id, rx }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(job_id = %job_id, "Reconciliation queue full, job left for retry");
                Err(QueueError::Full { job_id })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(job_id = %job_id, "Reconciliation queue closed, job left for retry");
                Err(QueueError::Closed { job_id })
            }
        }
    }

    /// Resubmits every summary that is neither reconciled nor in progress.
    pub async fn retry_failed(&self) -> QueueResult<RetryReport> {
        let retryable = self.ledger.list_retryable().await?;
        let mut report = RetryReport {
            scanned: retryable.len(),
            ..RetryReport::default()
        };

        for summary in &retryable {
            let Some(job) = ReconciliationJob::from_summary(summary) else {
                report.missing_payload.push(summary.id);
                continue;
            };
            match self.submit(job) {
                Ok(ticket) => report.submitted.push(ticket),
                Err(e) => report.rejected.push((summary.id, e)),
            }
        }

        info!(
            scanned = report.scanned,
            submitted = report.submitted.len(),
            rejected = report.rejected.len(),
            missing_payload = report.missing_payload.len(),
            "Retry scan finished"
        );
        Ok(report)
    }

    pub async fn retry_job(&self, id: Uuid) -> QueueResult<RetryOutcome> {
        let Some(summary) = self.ledger.get_job(id).await? else {
            return Ok(RetryOutcome::NotFound);
        };

        if summary.is_cache_updated {
            return Ok(RetryOutcome::AlreadyReconciled);
        }
        if summary.in_progress {
            info!(job_id = %id, "Job is in progress, retry ignored");
            return Ok(RetryOutcome::AlreadyInProgress);
        }
        let Some(job) = ReconciliationJob::from_summary(&summary) else {
            warn!(job_id = %id, "Job has no payload to replay");
            return Ok(RetryOutcome::MissingPayload);
        };

        Ok(RetryOutcome::Submitted(self.submit(job)?))
    }

    /// Summaries in progress for longer than the stale bound.
    pub async fn stale_jobs(&self) -> QueueResult<Vec<JobSummary>> {
        let now = Utc::now();
        Ok(self
            .ledger
            .list_in_progress()
            .await?
            .into_iter()
            .filter(|job| job.is_stale(now, self.stale_job_after))
            .collect())
    }
}

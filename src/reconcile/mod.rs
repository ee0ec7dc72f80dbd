//! Background reconciliation of generated questions into the cache.
//!
//! A single consumer task drains a bounded channel in FIFO order, so cache writes from
//! different jobs never interleave. The request path only ever submits; it never waits.

mod error;
mod queue;
pub mod skeleton;
mod worker;


pub use error::{QueueError, QueueResult, ReconcileError};
pub use queue::{JobOutcome, JobTicket, QueueSettings, ReconcileQueue, RetryOutcome, RetryReport};
pub use skeleton::{CachePlan, CacheSkeleton, PendingEmbedding, SkeletonGroup, SlotTarget, UnitPlaceholder};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::JobSummary;
use crate::model::{AnswerGroup, TemplateGroup, UnitLevel};

/// Work item for the reconciliation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationJob {
    pub job_id: Uuid,
    pub not_found_questions: Vec<TemplateGroup>,
    pub processed_cache_skeleton: CacheSkeleton,
    pub unit_level: UnitLevel,
    pub newly_generated_answers: Vec<AnswerGroup>,
}

impl ReconciliationJob {
    /// Rebuilds the job from a summary. `None` when the payload was already cleared.
    pub fn from_summary(summary: &JobSummary) -> Option<Self> {
        let skeleton = summary.processed_cache_skeleton.as_ref()?;
        let answers = summary.newly_generated_answers.as_ref()?;
        Some(Self {
            job_id: summary.id,
            not_found_questions: summary.residual_template.clone().unwrap_or_default(),
            processed_cache_skeleton: skeleton.clone(),
            unit_level: summary.unit_level,
            newly_generated_answers: answers.clone(),
        })
    }
}

//! Retry policy and queue bookkeeping types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mlqueue_core::{Job, JobId};

/// Retry ceiling: a job whose `attempts` reached this value is failed permanently.
pub const MAX_RETRIES: u32 = 3;

/// Unit of the linear retry backoff.
pub const RETRY_DELAY_SECONDS: u64 = 60;

/// Retry ceiling and linear backoff (`base_delay * attempt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after which a job is failed instead of retried
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRIES, Duration::from_secs(RETRY_DELAY_SECONDS))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the retry that brings a job to `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Check if a job that has been attempted `attempts` times may be retried.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// What `retry` did with a failed job.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// A copy with `attempts` incremented waits in the delay lane until `ready_at`.
    Scheduled { attempts: u32, ready_at: DateTime<Utc> },
    /// Retry budget exhausted; the job was appended to the failed record.
    Failed,
}

/// Outcome of one [`JobQueue::claim`](super::JobQueue::claim): at most one
/// job, plus the malformed documents moved to the failed record on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claim {
    pub job: Option<Job>,
    pub rejected: Vec<FailedJob>,
}

/// A job parked in the delay lane.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayedJob {
    pub job: Job,
    pub ready_at: DateTime<Utc>,
}

/// Permanent-failure record entry, kept for operator inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedJob {
    /// Present when the document decoded far enough to recover its id.
    pub job_id: Option<JobId>,
    /// The encoded job exactly as it was stored.
    pub document: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedJob {
    pub fn from_job(job: &Job, reason: impl Into<String>) -> Self {
        Self {
            job_id: Some(job.id().clone()),
            document: job.encode(),
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }

    /// Entry for a document that could not be decoded.
    pub fn from_document(document: impl Into<String>, reason: impl Into<String>) -> Self {
        let document = document.into();
        let job_id = serde_json::from_str::<serde_json::Value>(&document)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(JobId::from));
        Self {
            job_id,
            document,
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }

    /// Decode the stored document, if it is a well-formed job.
    pub fn job(&self) -> Option<Job> {
        Job::decode(&self.document).ok()
    }
}

/// Read-only snapshot of lane sizes, used for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub fifo_depth: usize,
    pub priority_depth: usize,
    pub retry_count: usize,
    pub failed_count: usize,
}

impl QueueStats {
    /// Jobs ready to be popped right now (both live lanes).
    pub fn live_depth(&self) -> usize {
        self.fifo_depth + self.priority_depth
    }
}

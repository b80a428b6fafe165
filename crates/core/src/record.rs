//! Per-job status and result documents published by workers.
//!
//! Both are ephemeral: stores keep them under the job id with a time-to-live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::JobId;
use crate::job::{Job, JobType};

/// Lifecycle position of a job as observed by producers polling by id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    RetryScheduled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl StatusRecord {
    pub fn new(job: &Job, status: JobStatus) -> Self {
        Self {
            job_id: job.id().clone(),
            status,
            worker_id: None,
            attempts: job.attempts(),
            updated_at: Utc::now(),
            error: None,
        }
    }

    /// Status for a job known only by id (its document no longer decodes).
    pub fn for_id(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            worker_id: None,
            attempts: 0,
            updated_at: Utc::now(),
            error: None,
        }
    }

    pub fn with_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Successful handler output plus bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub job_id: JobId,
    pub job_type: JobType,
    pub result: JsonValue,
    pub worker_id: String,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(job: &Job, worker_id: impl Into<String>, result: JsonValue) -> Self {
        Self {
            job_id: job.id().clone(),
            job_type: job.job_type(),
            result,
            worker_id: worker_id.into(),
            attempts: job.attempts(),
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_snake_case() {
        let job = Job::new("j1", JobType::Classification, Default::default());
        let record = StatusRecord::new(&job, JobStatus::RetryScheduled)
            .with_worker("w1")
            .with_error("boom");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "retry_scheduled");
        assert_eq!(value["worker_id"], "w1");
        assert_eq!(value["error"], "boom");
        assert!(!record.status.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn result_record_carries_job_bookkeeping() {
        let job = Job::new("j1", JobType::Classification, Default::default())
            .with_incremented_attempts();
        let record = ResultRecord::new(&job, "w1", json!({"prediction": 1}));

        assert_eq!(record.job_id.as_str(), "j1");
        assert_eq!(record.attempts, 1);
        assert_eq!(record.result, json!({"prediction": 1}));

        let back: ResultRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(back, record);
    }
}

//! Single-threaded worker loop: claim, execute, report.
//!
//! Scale out by running more worker processes against the same queue; one
//! worker never runs two jobs at once.

use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mlqueue_core::{Job, JobStatus, ResultRecord, StatusRecord};
use mlqueue_infra::jobs::FailedJob;
use mlqueue_infra::{Heartbeat, JobQueue, KeyValueStore, Metrics, ResultStore, RetryOutcome, StoreError};

use crate::config::WorkerConfig;
use crate::registry::HandlerRegistry;

/// Longest uninterrupted sleep while backing off, so cancellation stays responsive.
const BACKOFF_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Processing,
    RetryScheduled,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Processing => "processing",
            WorkerState::RetryScheduled => "retry_scheduled",
        }
    }
}

/// Per-process counters, owned by the worker instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub infra_errors: u64,
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed,
    RetryScheduled { attempts: u32, ready_at: DateTime<Utc> },
    Failed,
}

pub struct Worker<Q, K> {
    id: String,
    queue: Q,
    results: ResultStore<K>,
    metrics: Metrics<K>,
    handlers: HandlerRegistry,
    config: WorkerConfig,
    stats: WorkerStats,
    state: WorkerState,
    last_retry_scan: Option<Instant>,
    last_heartbeat: Option<Instant>,
}

fn is_due(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
    last.is_none_or(|at| now.duration_since(at) >= interval)
}

impl<Q, K> Worker<Q, K>
where
    Q: JobQueue,
    K: KeyValueStore + Clone,
{
    pub fn new(config: WorkerConfig, queue: Q, kv: K, handlers: HandlerRegistry) -> Self {
        Self {
            id: config.worker_id.clone(),
            queue,
            results: ResultStore::with_ttl(kv.clone(), config.result_ttl),
            metrics: Metrics::new(kv),
            handlers,
            config,
            stats: WorkerStats::default(),
            state: WorkerState::Idle,
            last_retry_scan: None,
            last_heartbeat: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Loop until `shutdown` is cancelled. The token is checked once per
    /// iteration, so an in-flight job always finishes.
    pub fn run(&mut self, shutdown: &CancellationToken) -> WorkerStats {
        info!(worker = %self.id, handlers = ?self.handlers.job_types(), "worker started");

        while !shutdown.is_cancelled() {
            if let Err(err) = self.tick() {
                self.state = WorkerState::Idle;
                self.stats.infra_errors += 1;
                error!(
                    worker = %self.id,
                    error = %err,
                    backoff_ms = self.config.error_backoff.as_millis() as u64,
                    "queue infrastructure error"
                );
                self.backoff(shutdown);
            }
        }

        if let Err(err) = self.publish_heartbeat() {
            warn!(worker = %self.id, error = %err, "final heartbeat failed");
        }
        info!(
            worker = %self.id,
            processed = self.stats.processed,
            failed = self.stats.failed,
            dead_lettered = self.stats.dead_lettered,
            infra_errors = self.stats.infra_errors,
            "worker stopped"
        );
        self.stats.clone()
    }

    /// One loop iteration: due maintenance, then at most one job.
    ///
    /// `Ok(None)` means the pop timed out with nothing to do.
    pub fn tick(&mut self) -> Result<Option<Outcome>, StoreError> {
        let now = Instant::now();

        if is_due(self.last_retry_scan, self.config.retry_scan_interval, now) {
            self.last_retry_scan = Some(now);
            let moved = self.queue.process_retries()?;
            if moved > 0 {
                info!(worker = %self.id, moved, "requeued due retries");
            }
        }

        if is_due(self.last_heartbeat, self.config.heartbeat_interval, now) {
            self.last_heartbeat = Some(now);
            self.publish_heartbeat()?;
        }

        let claim = self.queue.claim(self.config.pop_timeout)?;
        for rejected in &claim.rejected {
            self.record_rejected(rejected)?;
        }
        match claim.job {
            Some(job) => self.process(job).map(Some),
            None => Ok(None),
        }
    }

    /// Publish a `failed` status for a document the queue could not decode,
    /// so producers polling its id stop seeing `queued`.
    fn record_rejected(&mut self, rejected: &FailedJob) -> Result<(), StoreError> {
        self.stats.dead_lettered += 1;
        let Some(job_id) = rejected.job_id.clone() else {
            return Ok(());
        };
        warn!(
            worker = %self.id,
            job_id = %job_id,
            error = %rejected.reason,
            "malformed job moved to failed record"
        );
        self.results.put_status(
            &StatusRecord::for_id(job_id, JobStatus::Failed)
                .with_worker(&self.id)
                .with_error(rejected.reason.clone()),
        )
    }

    /// Execute one job and record its outcome.
    ///
    /// Handler errors never escape: they route the job through the queue's
    /// retry path. Only store failures are returned as errors.
    pub fn process(&mut self, job: Job) -> Result<Outcome, StoreError> {
        self.state = WorkerState::Processing;
        debug!(
            worker = %self.id,
            job_id = %job.id(),
            job_type = %job.job_type(),
            attempts = job.attempts(),
            "processing job"
        );
        self.results
            .put_status(&StatusRecord::new(&job, JobStatus::Processing).with_worker(&self.id))?;

        let started = Instant::now();
        let outcome = match self.handlers.dispatch(&job) {
            Ok(output) => {
                self.results
                    .put_result(&ResultRecord::new(&job, &self.id, output))?;
                self.results.put_status(
                    &StatusRecord::new(&job, JobStatus::Completed).with_worker(&self.id),
                )?;
                self.metrics.record_processed()?;
                self.stats.processed += 1;

                info!(
                    worker = %self.id,
                    job_id = %job.id(),
                    job_type = %job.job_type(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                Outcome::Completed
            }
            Err(err) => {
                self.state = WorkerState::RetryScheduled;
                self.stats.failed += 1;
                let reason = err.to_string();
                warn!(
                    worker = %self.id,
                    job_id = %job.id(),
                    job_type = %job.job_type(),
                    attempts = job.attempts(),
                    error = %reason,
                    "job failed"
                );

                let outcome = match self.queue.retry(&job, &reason)? {
                    RetryOutcome::Scheduled { attempts, ready_at } => {
                        Outcome::RetryScheduled { attempts, ready_at }
                    }
                    RetryOutcome::Failed => {
                        self.stats.dead_lettered += 1;
                        error!(
                            worker = %self.id,
                            job_id = %job.id(),
                            attempts = job.attempts(),
                            "retries exhausted; job moved to failed record"
                        );
                        Outcome::Failed
                    }
                };
                self.metrics.record_failed()?;

                let status = match outcome {
                    Outcome::Failed => JobStatus::Failed,
                    _ => JobStatus::RetryScheduled,
                };
                self.results.put_status(
                    &StatusRecord::new(&job, status)
                        .with_worker(&self.id)
                        .with_error(reason),
                )?;
                outcome
            }
        };

        self.state = WorkerState::Idle;
        Ok(outcome)
    }

    fn publish_heartbeat(&self) -> Result<(), StoreError> {
        self.metrics.heartbeat(&Heartbeat {
            worker_id: self.id.clone(),
            state: self.state.as_str().to_string(),
            processed: self.stats.processed,
            failed: self.stats.failed,
            last_seen: Utc::now(),
        })
    }

    fn backoff(&self, shutdown: &CancellationToken) {
        // An unrepresentable deadline backs off until cancelled.
        let deadline = Instant::now().checked_add(self.config.error_backoff);
        while !shutdown.is_cancelled() {
            let remaining = deadline.map_or(BACKOFF_SLICE, |d| {
                d.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(BACKOFF_SLICE));
        }
    }
}

impl<Q, K> core::fmt::Debug for Worker<Q, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

//! Queue abstraction and the in-process backend.

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use mlqueue_core::{Job, Lane};

use super::types::{Claim, DelayedJob, FailedJob, QueueStats, RetryOutcome, RetryPolicy};
use crate::error::StoreError;

/// Durable hand-off point between producers and workers.
///
/// Three lanes: FIFO (priority 0), priority (highest first, ties in arrival
/// order) and delay (retries ordered by ready time). Implementations must pop
/// atomically so that two workers never receive the same push.
pub trait JobQueue: Send + Sync {
    /// Route `job` to the priority lane when `priority > 0`, else the FIFO lane.
    fn push(&self, job: &Job) -> Result<(), StoreError>;

    /// Take the highest-priority job if any, otherwise wait up to `timeout`
    /// for a FIFO job. A timeout too large to represent waits indefinitely.
    ///
    /// Malformed documents met on the way are moved to the failed record,
    /// skipped, and reported in [`Claim::rejected`].
    fn claim(&self, timeout: Duration) -> Result<Claim, StoreError>;

    /// Park `job` in the delay lane until `ready_at`. No retry accounting.
    fn schedule_retry(&self, job: &Job, ready_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Move every delayed job with `ready_at <= now` back to its live lane.
    fn process_retries_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Append to the permanent-failure record.
    fn mark_failed(&self, job: &Job, reason: &str) -> Result<(), StoreError>;

    fn stats(&self) -> Result<QueueStats, StoreError>;

    /// Snapshot of the delay lane, earliest first.
    fn delayed(&self) -> Result<Vec<DelayedJob>, StoreError>;

    /// Most recent failures first.
    fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, StoreError>;

    fn retry_policy(&self) -> &RetryPolicy;

    /// Schedule a retry for a job that just failed, or fail it permanently once
    /// its attempts reached the policy ceiling.
    ///
    /// The delay lane receives `job.with_incremented_attempts()`, ready at
    /// `now + delay_for_attempt(stored attempts)`.
    fn retry_at(
        &self,
        job: &Job,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RetryOutcome, StoreError> {
        let policy = self.retry_policy();
        if !policy.should_retry(job.attempts()) {
            self.mark_failed(job, reason)?;
            return Ok(RetryOutcome::Failed);
        }

        let next = job.with_incremented_attempts();
        let delay = chrono::Duration::from_std(policy.delay_for_attempt(next.attempts()))
            .map_err(|e| StoreError::Serialization(format!("retry delay out of range: {e}")))?;
        let ready_at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.schedule_retry(&next, ready_at)?;
        Ok(RetryOutcome::Scheduled {
            attempts: next.attempts(),
            ready_at,
        })
    }

    /// [`JobQueue::claim`] without the rejected documents. `Ok(None)` means
    /// the timeout elapsed.
    fn pop(&self, timeout: Duration) -> Result<Option<Job>, StoreError> {
        Ok(self.claim(timeout)?.job)
    }

    fn retry(&self, job: &Job, reason: &str) -> Result<RetryOutcome, StoreError> {
        self.retry_at(job, reason, Utc::now())
    }

    fn process_retries(&self) -> Result<usize, StoreError> {
        self.process_retries_at(Utc::now())
    }

    /// Jobs ready to pop (FIFO + priority).
    fn depth(&self) -> Result<usize, StoreError> {
        Ok(self.stats()?.live_depth())
    }
}

impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    fn push(&self, job: &Job) -> Result<(), StoreError> {
        (**self).push(job)
    }

    fn claim(&self, timeout: Duration) -> Result<Claim, StoreError> {
        (**self).claim(timeout)
    }

    fn schedule_retry(&self, job: &Job, ready_at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).schedule_retry(job, ready_at)
    }

    fn process_retries_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        (**self).process_retries_at(now)
    }

    fn mark_failed(&self, job: &Job, reason: &str) -> Result<(), StoreError> {
        (**self).mark_failed(job, reason)
    }

    fn stats(&self) -> Result<QueueStats, StoreError> {
        (**self).stats()
    }

    fn delayed(&self) -> Result<Vec<DelayedJob>, StoreError> {
        (**self).delayed()
    }

    fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, StoreError> {
        (**self).failed(limit)
    }

    fn retry_policy(&self) -> &RetryPolicy {
        (**self).retry_policy()
    }
}

#[derive(Debug, Default)]
struct Lanes {
    fifo: VecDeque<String>,
    priority: BTreeMap<(Reverse<u32>, u64), String>,
    delayed: BTreeMap<(DateTime<Utc>, u64), String>,
    failed: Vec<FailedJob>,
    seq: u64,
}

impl Lanes {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn push_encoded(&mut self, lane: Lane, priority: u32, document: String) {
        match lane {
            Lane::Priority => {
                let seq = self.next_seq();
                self.priority.insert((Reverse(priority), seq), document);
            }
            Lane::Fifo => self.fifo.push_back(document),
        }
    }

    fn take_next(&mut self) -> Option<String> {
        if let Some((_, document)) = self.priority.pop_first() {
            return Some(document);
        }
        self.fifo.pop_front()
    }
}

/// In-process queue for tests, dev and single-process deployments.
///
/// Jobs are held in their encoded form so the codec runs exactly as it does
/// against Redis.
#[derive(Debug)]
pub struct InMemoryJobQueue {
    lanes: Mutex<Lanes>,
    available: Condvar,
    policy: RetryPolicy,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            lanes: Mutex::new(Lanes::default()),
            available: Condvar::new(),
            policy,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Append an already-encoded document to the FIFO lane without decoding it.
    pub fn push_document(&self, document: impl Into<String>) -> Result<(), StoreError> {
        self.lock()?.fifo.push_back(document.into());
        self.available.notify_one();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Lanes>, StoreError> {
        self.lanes.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for InMemoryJobQueue {
    fn push(&self, job: &Job) -> Result<(), StoreError> {
        let document = job.encode();
        self.lock()?
            .push_encoded(job.lane(), job.priority(), document);
        self.available.notify_one();
        debug!(job_id = %job.id(), priority = job.priority(), "job pushed");
        Ok(())
    }

    fn claim(&self, timeout: Duration) -> Result<Claim, StoreError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut lanes = self.lock()?;
        let mut claim = Claim::default();

        loop {
            while let Some(document) = lanes.take_next() {
                match Job::decode(&document) {
                    Ok(job) => {
                        claim.job = Some(job);
                        return Ok(claim);
                    }
                    Err(err) => {
                        warn!(error = %err, "dropping malformed job to failed record");
                        let entry = FailedJob::from_document(document, err.to_string());
                        lanes.failed.push(entry.clone());
                        claim.rejected.push(entry);
                    }
                }
            }

            lanes = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(claim);
                    }
                    self.available
                        .wait_timeout(lanes, deadline - now)
                        .map_err(|_| StoreError::Poisoned)?
                        .0
                }
                None => self.available.wait(lanes).map_err(|_| StoreError::Poisoned)?,
            };
        }
    }

    fn schedule_retry(&self, job: &Job, ready_at: DateTime<Utc>) -> Result<(), StoreError> {
        let document = job.encode();
        let mut lanes = self.lock()?;
        let seq = lanes.next_seq();
        lanes.delayed.insert((ready_at, seq), document);
        Ok(())
    }

    fn process_retries_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut lanes = self.lock()?;
        let ready: Vec<_> = lanes
            .delayed
            .range(..=(now, u64::MAX))
            .map(|(key, _)| *key)
            .collect();

        let mut moved = 0;
        for key in ready {
            let Some(document) = lanes.delayed.remove(&key) else {
                continue;
            };
            match Job::decode(&document) {
                Ok(job) => {
                    lanes.push_encoded(job.lane(), job.priority(), document);
                    moved += 1;
                }
                Err(err) => {
                    warn!(error = %err, "dropping malformed delayed job to failed record");
                    lanes.failed.push(FailedJob::from_document(document, err.to_string()));
                }
            }
        }

        if moved > 0 {
            self.available.notify_all();
        }
        Ok(moved)
    }

    fn mark_failed(&self, job: &Job, reason: &str) -> Result<(), StoreError> {
        self.lock()?.failed.push(FailedJob::from_job(job, reason));
        Ok(())
    }

    fn stats(&self) -> Result<QueueStats, StoreError> {
        let lanes = self.lock()?;
        Ok(QueueStats {
            fifo_depth: lanes.fifo.len(),
            priority_depth: lanes.priority.len(),
            retry_count: lanes.delayed.len(),
            failed_count: lanes.failed.len(),
        })
    }

    fn delayed(&self) -> Result<Vec<DelayedJob>, StoreError> {
        let lanes = self.lock()?;
        Ok(lanes
            .delayed
            .iter()
            .filter_map(|((ready_at, _), document)| {
                Job::decode(document).ok().map(|job| DelayedJob {
                    job,
                    ready_at: *ready_at,
                })
            })
            .collect())
    }

    fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, StoreError> {
        let lanes = self.lock()?;
        Ok(lanes.failed.iter().rev().take(limit).cloned().collect())
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

//! Redis-backed job queue (durable, shared across worker processes).
//!
//! ## Keys
//!
//! - `{name}:fifo`: list, `LPUSH` on push, `BRPOP` on pop
//! - `{name}:priority`: sorted set scored by priority, popped with `ZPOPMAX`
//! - `{name}:delayed`: sorted set scored by ready time (unix millis)
//! - `{name}:failed`: list of JSON failure entries, newest at the head
//! - `{name}:seq`: counter used to keep equal scores in arrival order
//!
//! Sorted-set members carry a 20 digit sequence prefix (`{seq}:{document}`):
//! on the priority lane the prefix is `u64::MAX - seq`, so among equal scores
//! `ZPOPMAX` (which picks the lexicographically greatest member) returns the
//! oldest push. On the delay lane it only keeps identical documents distinct.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use mlqueue_core::{Job, Lane};

use super::store::JobQueue;
use super::types::{Claim, DelayedJob, FailedJob, QueueStats, RetryPolicy};
use crate::config::DEFAULT_QUEUE_NAME;
use crate::error::StoreError;

/// Longest single `BRPOP`; longer waits are served by looping.
const MAX_BLOCK: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RedisJobQueue {
    client: Arc<redis::Client>,
    name: String,
    policy: RetryPolicy,
}

impl RedisJobQueue {
    /// Create a queue over `redis_url` (e.g. `redis://localhost:6379`).
    ///
    /// No connection is made until the first command.
    pub fn new(redis_url: impl AsRef<str>, name: Option<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            name: name.unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            policy: RetryPolicy::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an already-encoded document to the FIFO lane without decoding it.
    pub fn push_document(&self, document: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(self.key("fifo"))
            .arg(document)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("LPUSH failed: {e}")))?;
        Ok(())
    }

    fn key(&self, lane: &str) -> String {
        format!("{}:{}", self.name, lane)
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client
            .get_connection()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    fn next_seq(&self, conn: &mut redis::Connection) -> Result<u64, StoreError> {
        redis::cmd("INCR")
            .arg(self.key("seq"))
            .query(conn)
            .map_err(|e| StoreError::Command(format!("INCR failed: {e}")))
    }

    fn push_encoded(
        &self,
        conn: &mut redis::Connection,
        lane: Lane,
        priority: u32,
        document: &str,
    ) -> Result<(), StoreError> {
        match lane {
            Lane::Fifo => {
                let _: i64 = redis::cmd("LPUSH")
                    .arg(self.key("fifo"))
                    .arg(document)
                    .query(conn)
                    .map_err(|e| StoreError::Command(format!("LPUSH failed: {e}")))?;
            }
            Lane::Priority => {
                let seq = self.next_seq(conn)?;
                let member = format!("{:020}:{}", u64::MAX - seq, document);
                let _: i64 = redis::cmd("ZADD")
                    .arg(self.key("priority"))
                    .arg(priority)
                    .arg(member)
                    .query(conn)
                    .map_err(|e| StoreError::Command(format!("ZADD failed: {e}")))?;
            }
        }
        Ok(())
    }

    fn pop_priority(&self, conn: &mut redis::Connection) -> Result<Option<String>, StoreError> {
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMAX")
            .arg(self.key("priority"))
            .arg(1)
            .query(conn)
            .map_err(|e| StoreError::Command(format!("ZPOPMAX failed: {e}")))?;

        Ok(popped
            .into_iter()
            .next()
            .map(|(member, _)| strip_seq(&member).to_string()))
    }

    fn pop_fifo(
        &self,
        conn: &mut redis::Connection,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        // BRPOP treats 0 as "block forever".
        if timeout < Duration::from_millis(1) {
            return redis::cmd("RPOP")
                .arg(self.key("fifo"))
                .query(conn)
                .map_err(|e| StoreError::Command(format!("RPOP failed: {e}")));
        }

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(self.key("fifo"))
            .arg(timeout.as_secs_f64())
            .query(conn)
            .map_err(|e| StoreError::Command(format!("BRPOP failed: {e}")))?;
        Ok(popped.map(|(_, document)| document))
    }

    fn dead_letter_document(
        &self,
        conn: &mut redis::Connection,
        document: String,
        reason: String,
    ) -> Result<FailedJob, StoreError> {
        warn!(queue = %self.name, error = %reason, "dropping malformed job to failed record");
        let entry = FailedJob::from_document(document, reason);
        let _: i64 = redis::cmd("LPUSH")
            .arg(self.key("failed"))
            .arg(serde_json::to_string(&entry)?)
            .query(conn)
            .map_err(|e| StoreError::Command(format!("LPUSH failed: {e}")))?;
        Ok(entry)
    }
}

fn strip_seq(member: &str) -> &str {
    member.split_once(':').map_or(member, |(_, document)| document)
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

impl JobQueue for RedisJobQueue {
    #[instrument(skip(self, job), fields(queue = %self.name, job_id = %job.id()), err)]
    fn push(&self, job: &Job) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        self.push_encoded(&mut conn, job.lane(), job.priority(), &job.encode())
    }

    #[instrument(skip(self), fields(queue = %self.name), err)]
    fn claim(&self, timeout: Duration) -> Result<Claim, StoreError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut conn = self.connection()?;
        let mut claim = Claim::default();

        loop {
            let remaining = deadline
                .map_or(MAX_BLOCK, |d| d.saturating_duration_since(Instant::now()))
                .min(MAX_BLOCK);
            let document = match self.pop_priority(&mut conn)? {
                Some(document) => Some(document),
                None => self.pop_fifo(&mut conn, remaining)?,
            };

            match document {
                Some(document) => match Job::decode(&document) {
                    Ok(job) => {
                        debug!(job_id = %job.id(), "job popped");
                        claim.job = Some(job);
                        return Ok(claim);
                    }
                    Err(err) => {
                        let entry =
                            self.dead_letter_document(&mut conn, document, err.to_string())?;
                        claim.rejected.push(entry);
                    }
                },
                None if deadline.is_none_or(|d| Instant::now() < d) => {}
                None => return Ok(claim),
            }
        }
    }

    #[instrument(skip(self, job), fields(queue = %self.name, job_id = %job.id()), err)]
    fn schedule_retry(&self, job: &Job, ready_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let seq = self.next_seq(&mut conn)?;
        let member = format!("{:020}:{}", seq, job.encode());

        let _: i64 = redis::cmd("ZADD")
            .arg(self.key("delayed"))
            .arg(to_millis(ready_at))
            .arg(member)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("ZADD failed: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.name), err)]
    fn process_retries_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut conn = self.connection()?;
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("delayed"))
            .arg("-inf")
            .arg(to_millis(now))
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("ZRANGEBYSCORE failed: {e}")))?;

        let mut moved = 0;
        for member in due {
            // Claim by removal: a concurrent drainer that lost the race sees 0.
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.key("delayed"))
                .arg(&member)
                .query(&mut conn)
                .map_err(|e| StoreError::Command(format!("ZREM failed: {e}")))?;
            if removed == 0 {
                continue;
            }

            let document = strip_seq(&member);
            match Job::decode(document) {
                Ok(job) => {
                    self.push_encoded(&mut conn, job.lane(), job.priority(), document)?;
                    moved += 1;
                }
                Err(err) => {
                    self.dead_letter_document(&mut conn, document.to_string(), err.to_string())?;
                }
            }
        }
        Ok(moved)
    }

    #[instrument(skip(self, job), fields(queue = %self.name, job_id = %job.id()), err)]
    fn mark_failed(&self, job: &Job, reason: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let entry = serde_json::to_string(&FailedJob::from_job(job, reason))?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(self.key("failed"))
            .arg(entry)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("LPUSH failed: {e}")))?;
        Ok(())
    }

    fn stats(&self) -> Result<QueueStats, StoreError> {
        let mut conn = self.connection()?;
        let (fifo_depth, priority_depth, retry_count, failed_count): (usize, usize, usize, usize) =
            redis::pipe()
                .cmd("LLEN")
                .arg(self.key("fifo"))
                .cmd("ZCARD")
                .arg(self.key("priority"))
                .cmd("ZCARD")
                .arg(self.key("delayed"))
                .cmd("LLEN")
                .arg(self.key("failed"))
                .query(&mut conn)
                .map_err(|e| StoreError::Command(format!("stats pipeline failed: {e}")))?;

        Ok(QueueStats {
            fifo_depth,
            priority_depth,
            retry_count,
            failed_count,
        })
    }

    fn delayed(&self) -> Result<Vec<DelayedJob>, StoreError> {
        let mut conn = self.connection()?;
        let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(self.key("delayed"))
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("ZRANGE failed: {e}")))?;

        Ok(members
            .into_iter()
            .filter_map(|(member, score)| {
                let job = Job::decode(strip_seq(&member)).ok()?;
                let ready_at = DateTime::<Utc>::from_timestamp_millis(score as i64)?;
                Some(DelayedJob { job, ready_at })
            })
            .collect())
    }

    fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key("failed"))
            .arg(0)
            .arg(limit as i64 - 1)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("LRANGE failed: {e}")))?;

        entries
            .iter()
            .map(|entry| serde_json::from_str(entry).map_err(StoreError::from))
            .collect()
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mlqueue_core::{JobId, JobType};
    use serde_json::json;

    use crate::jobs::types::RetryOutcome;

    fn test_queue() -> RedisJobQueue {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let name = format!("mlqueue-test-{}", JobId::new());
        RedisJobQueue::new(url, Some(name)).unwrap()
    }

    fn job(id: &str, priority: u32) -> Job {
        let payload = json!({"features": [1, 2, 3]}).as_object().cloned().unwrap();
        Job::new(id, JobType::Classification, payload).with_priority(priority)
    }

    #[test]
    fn sequence_prefix_orders_equal_priorities() {
        let first = format!("{:020}:a", u64::MAX - 1);
        let second = format!("{:020}:b", u64::MAX - 2);
        assert!(first > second);
        assert_eq!(strip_seq(&first), "a");
        assert_eq!(strip_seq(r#"00000000000000000007:{"id":"x:y"}"#), r#"{"id":"x:y"}"#);
    }

    #[test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    fn priority_then_fifo_against_redis() {
        let queue = test_queue();
        queue.push(&job("j2", 0)).unwrap();
        queue.push(&job("p1", 5)).unwrap();
        queue.push(&job("p2", 5)).unwrap();
        queue.push(&job("p3", 9)).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| queue.pop(Duration::ZERO).unwrap())
            .map(|j| j.id().to_string())
            .collect();
        assert_eq!(order, ["p3", "p1", "p2", "j2"]);
    }

    #[test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    fn retry_cycle_against_redis() {
        let queue = test_queue();
        let now = Utc::now();

        let RetryOutcome::Scheduled { ready_at, attempts } =
            queue.retry_at(&job("j4", 0), "boom", now).unwrap()
        else {
            panic!("expected scheduled retry");
        };
        assert_eq!(attempts, 1);
        assert_eq!(queue.delayed().unwrap()[0].job.attempts(), 1);

        assert_eq!(
            queue
                .process_retries_at(ready_at - chrono::Duration::seconds(1))
                .unwrap(),
            0
        );
        assert_eq!(queue.process_retries_at(ready_at).unwrap(), 1);
        assert_eq!(queue.stats().unwrap().fifo_depth, 1);

        queue.push_document("not json").unwrap();
        let popped = queue.pop(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(popped.id().as_str(), "j4");
        assert!(queue.pop(Duration::ZERO).unwrap().is_none());
        assert_eq!(queue.failed(10).unwrap().len(), 1);
    }

    #[test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    fn claim_reports_rejects_under_unbounded_timeout_against_redis() {
        let queue = test_queue();
        queue
            .push_document(r#"{"id":"bad","type":"translation","payload":{}}"#)
            .unwrap();
        queue.push(&job("j1", 0)).unwrap();

        let claim = queue.claim(Duration::from_secs(u64::MAX)).unwrap();
        assert_eq!(claim.job.unwrap().id().as_str(), "j1");
        assert_eq!(claim.rejected.len(), 1);
        assert_eq!(claim.rejected[0].job_id, Some(JobId::from("bad")));
    }
}

//! Job queue with priority ordering, delayed retry and a failed record.
//!
//! ## Design
//!
//! - Three lanes: FIFO, priority (highest first) and delay (retry backoff)
//! - Pop always prefers the priority lane; sustained priority traffic can
//!   starve the FIFO lane
//! - Delivery is at-most-once: a worker that dies between `pop` and
//!   `retry`/result storage loses the job
//! - Retry ceiling and linear backoff come from [`RetryPolicy`]
//! - No background thread: callers drive `process_retries` on an interval
//!
//! ## Components
//!
//! - `JobQueue`: backend abstraction plus the retry routing rules
//! - `InMemoryJobQueue`: `Mutex` + `Condvar` backend
//! - `RedisJobQueue`: lists and sorted sets (feature `redis`)

#[cfg(feature = "redis")]
pub mod redis;
pub mod store;
pub mod types;

#[cfg(feature = "redis")]
pub use self::redis::RedisJobQueue;
pub use store::{InMemoryJobQueue, JobQueue};
pub use types::{
    Claim, DelayedJob, FailedJob, MAX_RETRIES, QueueStats, RETRY_DELAY_SECONDS, RetryOutcome,
    RetryPolicy,
};

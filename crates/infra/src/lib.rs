//! Infrastructure layer: job queue backends, KV storage, results and metrics.

pub mod config;
pub mod error;
pub mod jobs;
pub mod kv;
pub mod metrics;
pub mod results;

pub use config::{Backends, QueueBackend, StoreConfig};
pub use error::StoreError;
pub use jobs::{InMemoryJobQueue, JobQueue, QueueStats, RetryOutcome, RetryPolicy};
pub use kv::{InMemoryKeyValueStore, KeyValueStore};
pub use metrics::{HealthReport, HealthStatus, HealthThresholds, Heartbeat, Metrics};
pub use results::ResultStore;

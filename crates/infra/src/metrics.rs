//! Shared counters, worker heartbeats and health evaluation.
//!
//! Workers publish; the health/metrics surface reads. Everything lives in the
//! same KV store so any number of worker processes report into one view.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::jobs::{JobQueue, QueueStats};
use crate::kv::KeyValueStore;

pub const PROCESSED_KEY: &str = "metrics:processed";
pub const FAILED_KEY: &str = "metrics:failed";
pub const HEARTBEAT_PREFIX: &str = "worker:";

/// Heartbeats expire on their own if a worker disappears.
pub const HEARTBEAT_TTL: Duration = Duration::from_secs(120);

/// A worker counts as active if its heartbeat is at most this old.
pub const ACTIVE_WORKER_WINDOW_SECS: i64 = 120;

/// Periodic liveness document published by each worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: String,
    pub state: String,
    pub processed: u64,
    pub failed: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub processed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub min_active_workers: usize,
    pub max_queue_depth: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_active_workers: 1,
            max_queue_depth: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub queue_depth: usize,
    pub priority_depth: usize,
    pub retry_count: usize,
    pub failed_count: usize,
    pub active_workers: usize,
    pub reasons: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Everything `/metrics` exposes in one read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub queue: QueueStats,
    pub counters: Counters,
    pub active_workers: usize,
    pub workers: Vec<Heartbeat>,
}

#[derive(Debug, Clone)]
pub struct Metrics<K> {
    kv: K,
    active_window: chrono::Duration,
}

impl<K: KeyValueStore> Metrics<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            active_window: chrono::Duration::seconds(ACTIVE_WORKER_WINDOW_SECS),
        }
    }

    pub fn record_processed(&self) -> Result<i64, StoreError> {
        self.kv.incr(PROCESSED_KEY)
    }

    pub fn record_failed(&self) -> Result<i64, StoreError> {
        self.kv.incr(FAILED_KEY)
    }

    pub fn counters(&self) -> Result<Counters, StoreError> {
        Ok(Counters {
            processed: self.counter(PROCESSED_KEY)?,
            failed: self.counter(FAILED_KEY)?,
        })
    }

    fn counter(&self, key: &str) -> Result<u64, StoreError> {
        match self.kv.get(key)? {
            Some(raw) => raw
                .parse()
                .map_err(|_| StoreError::Serialization(format!("counter `{key}` is not a number"))),
            None => Ok(0),
        }
    }

    pub fn heartbeat(&self, beat: &Heartbeat) -> Result<(), StoreError> {
        let body = serde_json::to_string(beat)?;
        self.kv.set_ex(
            &format!("{HEARTBEAT_PREFIX}{}", beat.worker_id),
            &body,
            HEARTBEAT_TTL,
        )
    }

    /// Every unexpired heartbeat. Unreadable documents are skipped.
    pub fn workers(&self) -> Result<Vec<Heartbeat>, StoreError> {
        Ok(self
            .kv
            .scan_prefix(HEARTBEAT_PREFIX)?
            .into_iter()
            .filter_map(|(key, body)| match serde_json::from_str(&body) {
                Ok(beat) => Some(beat),
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping unreadable heartbeat");
                    None
                }
            })
            .collect())
    }

    pub fn active_workers_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.count_active(&self.workers()?, now))
    }

    fn count_active(&self, workers: &[Heartbeat], now: DateTime<Utc>) -> usize {
        workers
            .iter()
            .filter(|beat| now - beat.last_seen <= self.active_window)
            .count()
    }

    pub fn health(
        &self,
        queue: &dyn JobQueue,
        thresholds: &HealthThresholds,
    ) -> Result<HealthReport, StoreError> {
        self.health_at(queue, thresholds, Utc::now())
    }

    pub fn health_at(
        &self,
        queue: &dyn JobQueue,
        thresholds: &HealthThresholds,
        now: DateTime<Utc>,
    ) -> Result<HealthReport, StoreError> {
        let stats = queue.stats()?;
        let active_workers = self.active_workers_at(now)?;
        let queue_depth = stats.live_depth();

        let mut reasons = Vec::new();
        if active_workers < thresholds.min_active_workers {
            reasons.push(format!(
                "{active_workers} active workers (minimum {})",
                thresholds.min_active_workers
            ));
        }
        if queue_depth > thresholds.max_queue_depth {
            reasons.push(format!(
                "queue depth {queue_depth} exceeds {}",
                thresholds.max_queue_depth
            ));
        }

        Ok(HealthReport {
            status: if reasons.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            queue_depth,
            priority_depth: stats.priority_depth,
            retry_count: stats.retry_count,
            failed_count: stats.failed_count,
            active_workers,
            reasons,
            checked_at: now,
        })
    }

    pub fn snapshot(&self, queue: &dyn JobQueue) -> Result<MetricsSnapshot, StoreError> {
        let workers = self.workers()?;
        Ok(MetricsSnapshot {
            queue: queue.stats()?,
            counters: self.counters()?,
            active_workers: self.count_active(&workers, Utc::now()),
            workers,
        })
    }
}

//! Worker configuration (environment driven).

use std::time::Duration;

use mlqueue_infra::StoreConfig;
use mlqueue_infra::config::{env_lookup, parse_var};

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Identity used in logs, heartbeats and result records
    pub worker_id: String,
    /// Queue/KV backend selection
    pub store: StoreConfig,
    /// How long one `pop` may block waiting for a FIFO job
    pub pop_timeout: Duration,
    /// Wall-clock interval between delay-lane scans
    pub retry_scan_interval: Duration,
    /// Lifetime of stored results and status documents
    pub result_ttl: Duration,
    /// Interval between heartbeat publications
    pub heartbeat_interval: Duration,
    /// Pause after an infrastructure error before the next iteration
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", std::process::id()),
            store: StoreConfig::default(),
            pop_timeout: Duration::from_secs(5),
            retry_scan_interval: Duration::from_secs(10),
            result_ttl: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(30),
            error_backoff: Duration::from_millis(1000),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_var(&lookup, key, default.as_secs()))
        };

        Self {
            worker_id: lookup("WORKER_ID").unwrap_or(defaults.worker_id),
            store: StoreConfig::from_lookup(&lookup),
            pop_timeout: secs("POP_TIMEOUT_SECS", defaults.pop_timeout),
            retry_scan_interval: secs("RETRY_SCAN_INTERVAL_SECS", defaults.retry_scan_interval),
            result_ttl: secs("RESULT_TTL_SECS", defaults.result_ttl),
            heartbeat_interval: secs("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            error_backoff: Duration::from_millis(parse_var(
                &lookup,
                "ERROR_BACKOFF_MS",
                defaults.error_backoff.as_millis() as u64,
            )),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    pub fn with_retry_scan_interval(mut self, interval: Duration) -> Self {
        self.retry_scan_interval = interval;
        self
    }

    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlqueue_infra::QueueBackend;

    #[test]
    fn reads_overrides_and_keeps_defaults() {
        let config = WorkerConfig::from_lookup(|key| match key {
            "WORKER_ID" => Some("w-7".to_string()),
            "QUEUE_BACKEND" => Some("memory".to_string()),
            "POP_TIMEOUT_SECS" => Some("2".to_string()),
            "ERROR_BACKOFF_MS" => Some("250".to_string()),
            "RESULT_TTL_SECS" => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(config.worker_id, "w-7");
        assert_eq!(config.store.backend, QueueBackend::Memory);
        assert_eq!(config.pop_timeout, Duration::from_secs(2));
        assert_eq!(config.error_backoff, Duration::from_millis(250));
        assert_eq!(config.result_ttl, Duration::from_secs(3600));
        assert_eq!(config.retry_scan_interval, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn defaults_use_pid_and_shared_backend() {
        let config = WorkerConfig::from_lookup(|_| None);
        assert_eq!(config.worker_id, format!("worker-{}", std::process::id()));
        assert_eq!(config.store.backend, QueueBackend::Redis);
    }
}

//! Backend selection from environment variables.
//!
//! - `QUEUE_BACKEND`: `redis` (default) or `memory`. The memory backend is
//!   private to one process, so the API and worker binaries only share a
//!   queue over Redis.
//! - `REDIS_URL`, else `redis://{REDIS_HOST}:{REDIS_PORT}` (defaults `127.0.0.1:6379`)
//! - `QUEUE_NAME`: key prefix for the Redis lanes (default `mlqueue`)

use core::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::error::StoreError;
use crate::jobs::{InMemoryJobQueue, JobQueue};
use crate::kv::{InMemoryKeyValueStore, KeyValueStore};

pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_QUEUE_NAME: &str = "mlqueue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    Memory,
    #[default]
    Redis,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Ok(QueueBackend::Memory),
            "redis" => Ok(QueueBackend::Redis),
            other => Err(format!("unknown queue backend `{other}`")),
        }
    }
}

/// Parse `key` via `lookup`, falling back to `default` (with a warning) when
/// the value is missing or unparsable.
pub fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = key, value = %raw, "invalid value; using default");
                default
            }
        },
        None => default,
    }
}

/// Process environment as a lookup function.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: QueueBackend,
    pub redis_url: String,
    pub queue_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            redis_url: format!("redis://{DEFAULT_REDIS_HOST}:{DEFAULT_REDIS_PORT}"),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    /// Process-local backends (tests, single-process dev).
    pub fn in_memory() -> Self {
        Self {
            backend: QueueBackend::Memory,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = parse_var(&lookup, "QUEUE_BACKEND", QueueBackend::default());
        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| {
            let host = lookup("REDIS_HOST").unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string());
            let port = parse_var(&lookup, "REDIS_PORT", DEFAULT_REDIS_PORT);
            format!("redis://{host}:{port}")
        });
        let queue_name = lookup("QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());

        Self {
            backend,
            redis_url,
            queue_name,
        }
    }

    /// Build the queue and KV backends this config selects.
    pub fn connect(&self) -> Result<Backends, StoreError> {
        match self.backend {
            QueueBackend::Memory => {
                warn!("memory backend selected; jobs are not shared with other processes");
                Ok(Backends {
                    queue: Arc::new(InMemoryJobQueue::new()),
                    kv: Arc::new(InMemoryKeyValueStore::new()),
                })
            }
            QueueBackend::Redis => self.connect_redis(),
        }
    }

    #[cfg(feature = "redis")]
    fn connect_redis(&self) -> Result<Backends, StoreError> {
        use crate::jobs::RedisJobQueue;
        use crate::kv::RedisKeyValueStore;

        Ok(Backends {
            queue: Arc::new(RedisJobQueue::new(
                &self.redis_url,
                Some(self.queue_name.clone()),
            )?),
            kv: Arc::new(RedisKeyValueStore::new(&self.redis_url)?),
        })
    }

    #[cfg(not(feature = "redis"))]
    fn connect_redis(&self) -> Result<Backends, StoreError> {
        Err(StoreError::Connection(
            "redis backend requested but mlqueue-infra was built without the `redis` feature"
                .to_string(),
        ))
    }
}

/// Shared handles to the selected backends.
#[derive(Clone)]
pub struct Backends {
    pub queue: Arc<dyn JobQueue>,
    pub kv: Arc<dyn KeyValueStore>,
}

impl core::fmt::Debug for Backends {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

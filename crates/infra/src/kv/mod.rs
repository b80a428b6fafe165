//! Expiring key/value storage for results, status documents and metrics.

#[cfg(feature = "redis")]
pub mod redis;
mod in_memory;

use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;

#[cfg(feature = "redis")]
pub use self::redis::RedisKeyValueStore;
pub use in_memory::InMemoryKeyValueStore;

/// Minimal string KV contract with time-to-live support.
pub trait KeyValueStore: Send + Sync {
    /// `None` for missing or expired keys.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite `key`, expiring it after `ttl`.
    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Increment an integer counter (missing keys start at 0). Keeps any TTL.
    fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// All live entries whose key starts with `prefix`, sorted by key.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}

impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set_ex(key, value, ttl)
    }

    fn incr(&self, key: &str) -> Result<i64, StoreError> {
        (**self).incr(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        (**self).scan_prefix(prefix)
    }
}

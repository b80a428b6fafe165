//! Redis-backed KV store (`PSETEX`, `GET`, `INCR`, `SCAN`).

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use super::KeyValueStore;
use crate::error::StoreError;

const SCAN_BATCH: usize = 100;

/// Upper bound for `PSETEX`; Redis rejects expiries that overflow `now + ttl`.
const MAX_TTL_MILLIS: u64 = (i64::MAX / 2) as u64;

#[derive(Debug, Clone)]
pub struct RedisKeyValueStore {
    client: Arc<redis::Client>,
}

impl RedisKeyValueStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client
            .get_connection()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_TTL_MILLIS)
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

impl KeyValueStore for RedisKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("GET")
            .arg(key)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("GET failed: {e}")))
    }

    #[instrument(skip(self, value), err)]
    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let millis = ttl_millis(ttl);
        let _: () = redis::cmd("PSETEX")
            .arg(key)
            .arg(millis)
            .arg(value)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("PSETEX failed: {e}")))?;
        Ok(())
    }

    fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection()?;
        redis::cmd("INCR")
            .arg(key)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("INCR failed: {e}")))
    }

    #[instrument(skip(self), err)]
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.connection()?;
        let pattern = match_pattern(prefix);

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query(&mut conn)
                .map_err(|e| StoreError::Command(format!("SCAN failed: {e}")))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query(&mut conn)
            .map_err(|e| StoreError::Command(format!("MGET failed: {e}")))?;

        // Keys that expired between SCAN and MGET come back as nil.
        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_pattern_escapes_glob_characters() {
        assert_eq!(match_pattern("worker:"), "worker:*");
        assert_eq!(match_pattern("a*b?[c]"), r"a\*b\?\[c\]*");
    }

    #[test]
    fn ttl_is_clamped_into_psetex_range() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(ttl_millis(Duration::from_secs(u64::MAX)), MAX_TTL_MILLIS);
    }

    #[test]
    #[ignore = "requires a running Redis (REDIS_URL)"]
    fn set_get_incr_scan_against_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let store = RedisKeyValueStore::new(url).unwrap();
        let prefix = format!("mlqueue-kv-test-{}:", mlqueue_core::JobId::new());

        store
            .set_ex(&format!("{prefix}a"), "1", Duration::from_secs(30))
            .unwrap();
        assert_eq!(
            store.get(&format!("{prefix}a")).unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(store.incr(&format!("{prefix}n")).unwrap(), 1);
        assert_eq!(store.scan_prefix(&prefix).unwrap().len(), 2);
    }
}

//! Job results and status documents, keyed by job id with a TTL.
//!
//! - `result:{id}`: [`ResultRecord`] written on success
//! - `job:{id}`: latest [`StatusRecord`] (queued, processing, retry scheduled...)

use std::time::Duration;

use mlqueue_core::{JobId, ResultRecord, StatusRecord};

use crate::error::StoreError;
use crate::kv::KeyValueStore;

/// How long results and status documents stay readable.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(3600);

pub fn result_key(id: &JobId) -> String {
    format!("result:{id}")
}

pub fn status_key(id: &JobId) -> String {
    format!("job:{id}")
}

#[derive(Debug, Clone)]
pub struct ResultStore<K> {
    kv: K,
    ttl: Duration,
}

impl<K: KeyValueStore> ResultStore<K> {
    pub fn new(kv: K) -> Self {
        Self::with_ttl(kv, DEFAULT_RESULT_TTL)
    }

    pub fn with_ttl(kv: K, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn put_result(&self, record: &ResultRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        self.kv.set_ex(&result_key(&record.job_id), &body, self.ttl)
    }

    pub fn get_result(&self, id: &JobId) -> Result<Option<ResultRecord>, StoreError> {
        self.read(&result_key(id))
    }

    pub fn put_status(&self, record: &StatusRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        self.kv.set_ex(&status_key(&record.job_id), &body, self.ttl)
    }

    pub fn get_status(&self, id: &JobId) -> Result<Option<StatusRecord>, StoreError> {
        self.read(&status_key(id))
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.kv.get(key)? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use mlqueue_core::{Job, JobStatus, JobType};
    use serde_json::json;

    use crate::kv::InMemoryKeyValueStore;

    fn job() -> Job {
        let payload = json!({"features": [1, 2, 3]}).as_object().cloned().unwrap();
        Job::new("j1", JobType::Classification, payload)
    }

    #[test]
    fn result_readable_until_ttl_expires() {
        let store = ResultStore::with_ttl(InMemoryKeyValueStore::arc(), Duration::from_millis(50));
        let record = ResultRecord::new(&job(), "w1", json!({"prediction": 1}));

        store.put_result(&record).unwrap();
        let fetched = store.get_result(&JobId::from("j1")).unwrap().unwrap();
        assert_eq!(fetched.result, json!({"prediction": 1}));
        assert_eq!(fetched.worker_id, "w1");

        thread::sleep(Duration::from_millis(80));
        assert!(store.get_result(&JobId::from("j1")).unwrap().is_none());
    }

    #[test]
    fn status_overwrites_previous_document() {
        let store = ResultStore::new(InMemoryKeyValueStore::arc());
        store
            .put_status(&StatusRecord::new(&job(), JobStatus::Processing))
            .unwrap();
        store
            .put_status(&StatusRecord::new(&job(), JobStatus::Completed))
            .unwrap();

        let status = store.get_status(&JobId::from("j1")).unwrap().unwrap();
        assert_eq!(status.status, JobStatus::Completed);
    }

    #[test]
    fn corrupt_document_is_a_serialization_error() {
        let kv = InMemoryKeyValueStore::arc();
        kv.set_ex("result:j1", "{oops", Duration::from_secs(60))
            .unwrap();
        let store = ResultStore::new(kv);

        assert!(matches!(
            store.get_result(&JobId::from("j1")),
            Err(StoreError::Serialization(_))
        ));
    }
}

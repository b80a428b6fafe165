//! Backend wiring shared by every route.

use std::sync::Arc;

use mlqueue_core::{Job, JobId, JobStatus, ResultRecord, StatusRecord};
use mlqueue_infra::metrics::MetricsSnapshot;
use mlqueue_infra::{
    Backends, HealthReport, HealthThresholds, JobQueue, KeyValueStore, Metrics, ResultStore,
    StoreConfig, StoreError,
};
use mlqueue_infra::jobs::FailedJob;
use tracing::warn;

use crate::app::errors::ApiError;

type SharedKv = Arc<dyn KeyValueStore>;

#[derive(Clone)]
pub struct AppServices {
    queue: Arc<dyn JobQueue>,
    results: ResultStore<SharedKv>,
    metrics: Metrics<SharedKv>,
    thresholds: HealthThresholds,
}

impl AppServices {
    pub fn new(backends: Backends) -> Self {
        Self {
            queue: backends.queue,
            results: ResultStore::new(Arc::clone(&backends.kv)),
            metrics: Metrics::new(backends.kv),
            thresholds: HealthThresholds::default(),
        }
    }

    /// Self-contained in-memory wiring (dev/test).
    pub fn in_memory() -> Self {
        Self::new(Backends {
            queue: Arc::new(mlqueue_infra::InMemoryJobQueue::new()),
            kv: Arc::new(mlqueue_infra::InMemoryKeyValueStore::new()),
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::new(config.connect()?))
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Publish a `queued` status document, then enqueue.
    ///
    /// The status goes first: once pushed, a worker may finish the job before
    /// this returns. A failed push overwrites it with `failed`.
    pub fn submit(&self, job: &Job) -> Result<(), StoreError> {
        self.results
            .put_status(&StatusRecord::new(job, JobStatus::Queued))?;

        if let Err(err) = self.queue.push(job) {
            let status = StatusRecord::new(job, JobStatus::Failed)
                .with_error(format!("enqueue failed: {err}"));
            if let Err(status_err) = self.results.put_status(&status) {
                warn!(job_id = %job.id(), error = %status_err, "could not record enqueue failure");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Run `op` on the blocking pool. Backends hold synchronous connections,
    /// so store calls never run on a runtime worker thread.
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&AppServices) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let services = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&services))
            .await
            .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
    }

    pub fn status(&self, id: &JobId) -> Result<Option<StatusRecord>, StoreError> {
        self.results.get_status(id)
    }

    pub fn result(&self, id: &JobId) -> Result<Option<ResultRecord>, StoreError> {
        self.results.get_result(id)
    }

    pub fn failed(&self, limit: usize) -> Result<Vec<FailedJob>, StoreError> {
        self.queue.failed(limit)
    }

    pub fn health(&self) -> Result<HealthReport, StoreError> {
        self.metrics.health(self.queue.as_ref(), &self.thresholds)
    }

    pub fn metrics(&self) -> Result<MetricsSnapshot, StoreError> {
        self.metrics.snapshot(self.queue.as_ref())
    }
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

//! End-to-end flows through queue, worker and result store (in-memory backends).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use mlqueue_ai::HandlerError;
use mlqueue_core::{Job, JobId, JobStatus, JobType, Payload};
use mlqueue_infra::jobs::{MAX_RETRIES, RETRY_DELAY_SECONDS};
use mlqueue_infra::{
    HealthStatus, HealthThresholds, InMemoryJobQueue, InMemoryKeyValueStore, JobQueue, Metrics,
    ResultStore,
};
use mlqueue_worker::{HandlerRegistry, Outcome, Worker, WorkerConfig};

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

fn config() -> WorkerConfig {
    WorkerConfig::default()
        .with_worker_id("scenario-worker")
        .with_pop_timeout(Duration::ZERO)
}

#[test]
fn classification_result_is_fetchable_until_ttl_expires() {
    let queue = InMemoryJobQueue::arc();
    let kv = InMemoryKeyValueStore::arc();
    let ttl = Duration::from_millis(150);
    let mut worker = Worker::new(
        config().with_result_ttl(ttl),
        Arc::clone(&queue),
        Arc::clone(&kv),
        HandlerRegistry::with_default_models(),
    );

    queue
        .push(&Job::new(
            "j1",
            JobType::Classification,
            payload(json!({"features": [1, 2, 3]})),
        ))
        .unwrap();
    assert_eq!(worker.tick().unwrap(), Some(Outcome::Completed));

    let results = ResultStore::new(Arc::clone(&kv));
    let record = results.get_result(&JobId::from("j1")).unwrap().unwrap();
    assert_eq!(record.result["prediction"], json!(1));
    assert_eq!(record.job_type, JobType::Classification);
    assert_eq!(record.attempts, 0);

    thread::sleep(ttl + Duration::from_millis(50));
    assert!(results.get_result(&JobId::from("j1")).unwrap().is_none());
}

#[test]
fn priority_job_is_processed_before_earlier_fifo_job() {
    let queue = InMemoryJobQueue::arc();
    let kv = InMemoryKeyValueStore::arc();
    let mut worker = Worker::new(
        config(),
        Arc::clone(&queue),
        Arc::clone(&kv),
        HandlerRegistry::with_default_models(),
    );

    let text = payload(json!({"text": "great service"}));
    queue
        .push(&Job::new("j2", JobType::SentimentAnalysis, text.clone()))
        .unwrap();
    queue
        .push(&Job::new("j3", JobType::SentimentAnalysis, text).with_priority(5))
        .unwrap();

    worker.tick().unwrap();
    let results = ResultStore::new(Arc::clone(&kv));
    assert!(results.get_result(&JobId::from("j3")).unwrap().is_some());
    assert!(results.get_result(&JobId::from("j2")).unwrap().is_none());

    worker.tick().unwrap();
    assert!(results.get_result(&JobId::from("j2")).unwrap().is_some());
}

#[test]
fn failing_job_backs_off_then_lands_in_failed_record() {
    let queue = InMemoryJobQueue::arc();
    let kv = InMemoryKeyValueStore::arc();
    let mut handlers = HandlerRegistry::new();
    handlers.register_fn(JobType::Classification, |_| {
        Err(HandlerError::InferenceFailed("weights missing".into()))
    });
    let mut worker = Worker::new(config(), Arc::clone(&queue), Arc::clone(&kv), handlers);

    let mut job = Job::new(
        "j4",
        JobType::Classification,
        payload(json!({"features": [1, 2, 3]})),
    );
    for expected in 1..=MAX_RETRIES {
        let before = Utc::now();
        let Outcome::RetryScheduled { attempts, ready_at } = worker.process(job).unwrap() else {
            panic!("retry {expected} should be scheduled");
        };
        assert_eq!(attempts, expected);

        let delayed = queue.delayed().unwrap();
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].job.id().as_str(), "j4");
        assert_eq!(delayed[0].job.attempts(), expected);
        let delay = chrono::Duration::seconds((RETRY_DELAY_SECONDS * u64::from(expected)) as i64);
        assert!(ready_at >= before + delay);
        assert!(ready_at <= Utc::now() + delay);

        assert_eq!(queue.process_retries_at(ready_at).unwrap(), 1);
        job = queue.pop(Duration::ZERO).unwrap().unwrap();
    }

    assert_eq!(worker.process(job).unwrap(), Outcome::Failed);
    assert!(queue.delayed().unwrap().is_empty());
    assert_eq!(queue.depth().unwrap(), 0);

    let failed = queue.failed(10).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_id, Some(JobId::from("j4")));

    let status = ResultStore::new(Arc::clone(&kv))
        .get_status(&JobId::from("j4"))
        .unwrap()
        .unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(worker.stats().failed, u64::from(MAX_RETRIES) + 1);
    assert_eq!(worker.stats().dead_lettered, 1);
}

#[test]
fn health_turns_healthy_once_a_worker_heartbeats() {
    let queue = InMemoryJobQueue::arc();
    let kv = InMemoryKeyValueStore::arc();
    let metrics = Metrics::new(Arc::clone(&kv));
    let thresholds = HealthThresholds::default();

    let report = metrics.health(queue.as_ref(), &thresholds).unwrap();
    assert_eq!(report.status, HealthStatus::Degraded);

    let mut worker = Worker::new(
        config(),
        Arc::clone(&queue),
        Arc::clone(&kv),
        HandlerRegistry::with_default_models(),
    );
    worker.tick().unwrap();

    let report = metrics.health(queue.as_ref(), &thresholds).unwrap();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.active_workers, 1);
}

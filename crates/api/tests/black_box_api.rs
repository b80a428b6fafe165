use std::sync::Arc;
use std::time::Duration;

use mlqueue_api::app::{AppServices, build_app};
use mlqueue_core::{Job, JobType};
use mlqueue_infra::{Backends, StoreConfig};
use mlqueue_worker::{HandlerRegistry, Worker, WorkerConfig};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    backends: Backends,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory backends, bound to an ephemeral port.
        let backends = StoreConfig::in_memory()
            .connect()
            .expect("in-memory backends");
        let services = Arc::new(AppServices::new(backends.clone()));
        let app = build_app(Arc::clone(&services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            backends,
            services,
            handle,
        }
    }

    /// A worker sharing this server's queue and KV store.
    fn worker(&self) -> Worker<Arc<dyn mlqueue_infra::JobQueue>, Arc<dyn mlqueue_infra::KeyValueStore>> {
        let config = WorkerConfig::default()
            .with_worker_id("api-test-worker")
            .with_pop_timeout(Duration::ZERO);
        Worker::new(
            config,
            Arc::clone(&self.backends.queue),
            Arc::clone(&self.backends.kv),
            HandlerRegistry::with_default_models(),
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_degraded_without_workers() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["active_workers"], 0);
}

#[tokio::test]
async fn submitted_job_is_processed_and_result_fetchable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/jobs", srv.base_url))
        .json(&json!({
            "id": "j1",
            "type": "classification",
            "payload": { "features": [1, 2, 3] }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: serde_json::Value = res.json().await.unwrap();
    assert_eq!(accepted["job_id"], "j1");
    assert_eq!(accepted["status"], "queued");

    let res = client
        .get(format!("{}/jobs/j1", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view: serde_json::Value = res.json().await.unwrap();
    assert_eq!(view["status"], "queued");
    assert!(view.get("result").is_none());

    let res = client
        .get(format!("{}/jobs/j1/result", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let mut worker = srv.worker();
    worker.tick().unwrap();

    let view: serde_json::Value = client
        .get(format!("{}/jobs/j1", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["status"], "completed");
    assert_eq!(view["worker_id"], "api-test-worker");
    assert_eq!(view["result"]["result"]["prediction"], 1);

    let res = client
        .get(format!("{}/jobs/j1/result", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let record: serde_json::Value = res.json().await.unwrap();
    assert_eq!(record["job_type"], "classification");
    assert_eq!(record["result"]["prediction"], 1);
}

#[tokio::test]
async fn malformed_submission_names_the_field() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/jobs", srv.base_url))
        .json(&json!({ "type": "translation", "payload": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "malformed_job");
    assert_eq!(body["field"], "type");

    let res = client
        .post(format!("{}/jobs", srv.base_url))
        .json(&json!({ "type": "classification" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["field"], "payload");
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(format!("{}/jobs/nope", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn failed_jobs_are_listed_newest_first() {
    let srv = TestServer::spawn().await;
    let queue = srv.services.queue();
    for id in ["f1", "f2", "f3"] {
        let job = Job::new(id, JobType::SentimentAnalysis, Default::default());
        queue.mark_failed(&job, "retries exhausted").unwrap();
    }

    let res = reqwest::get(format!("{}/jobs/failed?limit=2", srv.base_url))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let ids: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["job_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["f3", "f2"]);
}

#[tokio::test]
async fn metrics_and_health_reflect_worker_activity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for (id, priority) in [("m1", 0), ("m2", 3)] {
        let res = client
            .post(format!("{}/jobs", srv.base_url))
            .json(&json!({
                "id": id,
                "type": "sentiment_analysis",
                "payload": { "text": "love it" },
                "priority": priority
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    let metrics: serde_json::Value = client
        .get(format!("{}/metrics", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["queue"]["fifo_depth"], 1);
    assert_eq!(metrics["queue"]["priority_depth"], 1);
    assert_eq!(metrics["counters"]["processed"], 0);

    let mut worker = srv.worker();
    worker.tick().unwrap();
    worker.tick().unwrap();

    let metrics: serde_json::Value = client
        .get(format!("{}/metrics", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["counters"]["processed"], 2);
    assert_eq!(metrics["active_workers"], 1);
    assert_eq!(metrics["workers"][0]["worker_id"], "api-test-worker");

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn request_id_is_echoed() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/metrics", srv.base_url))
        .header("x-request-id", "trace-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-123");

    let res = client
        .get(format!("{}/metrics", srv.base_url))
        .send()
        .await
        .unwrap();
    assert!(res.headers().contains_key("x-request-id"));
}

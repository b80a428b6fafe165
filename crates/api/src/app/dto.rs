use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use mlqueue_core::{Job, JobId, JobStatus, MalformedJobError, ResultRecord, StatusRecord};

// -------------------------
// Request DTOs
// -------------------------

/// Default page size for `GET /jobs/failed`.
pub const DEFAULT_FAILED_LIMIT: usize = 50;
pub const MAX_FAILED_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct FailedQuery {
    pub limit: Option<usize>,
}

impl FailedQuery {
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_FAILED_LIMIT)
            .min(MAX_FAILED_LIMIT)
    }
}

/// Build a job from a producer's `{ id?, type, payload, priority? }` body.
///
/// Producers cannot set `attempts` or `created_at`; a missing id is generated.
pub fn job_from_request(body: JsonValue) -> Result<Job, MalformedJobError> {
    let JsonValue::Object(mut doc) = body else {
        return Err(MalformedJobError::invalid("<root>", "expected a JSON object"));
    };
    doc.remove("attempts");
    doc.remove("created_at");
    if !doc.contains_key("id") {
        doc.insert("id".to_string(), JsonValue::String(JobId::new().to_string()));
    }
    Job::from_value(JsonValue::Object(doc))
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub priority: u32,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub status: StatusRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_id_gets_generated_one() {
        let job = job_from_request(json!({
            "type": "sentiment_analysis",
            "payload": {"text": "hi"},
            "attempts": 9
        }))
        .unwrap();
        assert!(!job.id().as_str().is_empty());
        assert_eq!(job.attempts(), 0);
    }

    #[test]
    fn request_errors_name_the_field() {
        let err = job_from_request(json!({"id": "j1", "type": "classification"})).unwrap_err();
        assert_eq!(err.field(), "payload");

        let err = job_from_request(json!([1])).unwrap_err();
        assert_eq!(err.field(), "<root>");
    }

    #[test]
    fn failed_limit_is_clamped() {
        assert_eq!(FailedQuery { limit: None }.limit(), DEFAULT_FAILED_LIMIT);
        assert_eq!(FailedQuery { limit: Some(5_000) }.limit(), MAX_FAILED_LIMIT);
    }
}

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use mlqueue_core::{Job, JobType};

/// Executes one kind of job.
///
/// Implementations parse the job payload into their own strongly typed input
/// (see [`parse_input`]) and return a JSON result document.
pub trait JobHandler: Send + Sync + 'static {
    /// The job kind this handler is registered for.
    fn job_type(&self) -> JobType;

    /// Run inference. Must not mutate queue or store state.
    fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError>;
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("no handler registered for job type `{0}`")]
    NoHandler(JobType),
}

/// Deserialize a job payload into a handler's typed input.
pub fn parse_input<T: DeserializeOwned>(job: &Job) -> Result<T, HandlerError> {
    serde_json::from_value(JsonValue::Object(job.payload().clone()))
        .map_err(|e| HandlerError::InvalidInput(format!("{} payload: {e}", job.job_type())))
}

//! Handler lookup keyed by job type.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use mlqueue_ai::{
    ClassificationHandler, HandlerError, ImageClassificationHandler, JobHandler, SentimentHandler,
};
use mlqueue_core::{Job, JobType};

/// Maps each [`JobType`] to at most one handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Box<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in model handlers for every job type.
    pub fn with_default_models() -> Self {
        let mut registry = Self::new();
        registry.register(ClassificationHandler::new());
        registry.register(SentimentHandler::new());
        registry.register(ImageClassificationHandler::new());
        registry
    }

    /// Register `handler` for its job type, replacing any previous one.
    pub fn register<H: JobHandler>(&mut self, handler: H) -> &mut Self {
        self.handlers.insert(handler.job_type(), Box::new(handler));
        self
    }

    /// Register a closure as the handler for `job_type`.
    pub fn register_fn<F>(&mut self, job_type: JobType, handler: F) -> &mut Self
    where
        F: Fn(&Job) -> Result<JsonValue, HandlerError> + Send + Sync + 'static,
    {
        self.register(FnHandler { job_type, handler })
    }

    pub fn get(&self, job_type: JobType) -> Option<&dyn JobHandler> {
        self.handlers.get(&job_type).map(|h| h.as_ref())
    }

    /// Run the registered handler, or fail with `NoHandler`.
    pub fn dispatch(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        match self.get(job.job_type()) {
            Some(handler) => handler.handle(job),
            None => Err(HandlerError::NoHandler(job.job_type())),
        }
    }

    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

struct FnHandler<F> {
    job_type: JobType,
    handler: F,
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> Result<JsonValue, HandlerError> + Send + Sync + 'static,
{
    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        (self.handler)(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_models_cover_every_job_type() {
        let registry = HandlerRegistry::with_default_models();
        assert_eq!(registry.job_types(), JobType::ALL.to_vec());
    }

    #[test]
    fn missing_handler_is_reported_not_panicked() {
        let registry = HandlerRegistry::new();
        let job = Job::new("j1", JobType::SentimentAnalysis, Default::default());

        let err = registry.dispatch(&job).unwrap_err();
        assert!(matches!(err, HandlerError::NoHandler(JobType::SentimentAnalysis)));
    }

    #[test]
    fn closures_replace_built_in_handlers() {
        let mut registry = HandlerRegistry::with_default_models();
        registry.register_fn(JobType::Classification, |_| Ok(json!({"prediction": 7})));

        let job = Job::new("j1", JobType::Classification, Default::default());
        assert_eq!(registry.dispatch(&job).unwrap(), json!({"prediction": 7}));
        assert_eq!(registry.len(), 3);
    }
}

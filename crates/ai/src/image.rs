use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use mlqueue_core::{Job, JobType};

use crate::handler::{HandlerError, JobHandler, parse_input};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    /// Path or URL of the image to classify.
    pub image: String,
}

/// Stand-in image classifier.
///
/// No vision model ships with the worker; results are flagged `simulated`.
#[derive(Debug, Clone)]
pub struct ImageClassificationHandler {
    label: String,
    confidence: f64,
}

impl Default for ImageClassificationHandler {
    fn default() -> Self {
        Self {
            label: "cat".to_string(),
            confidence: 0.92,
        }
    }
}

impl ImageClassificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>, confidence: f64) -> Self {
        self.label = label.into();
        self.confidence = confidence;
        self
    }
}

impl JobHandler for ImageClassificationHandler {
    fn job_type(&self) -> JobType {
        JobType::ImageClassification
    }

    fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        let input: ImageInput = parse_input(job)?;
        if input.image.trim().is_empty() {
            return Err(HandlerError::InvalidInput("image reference cannot be empty".to_string()));
        }

        tracing::debug!(job_id = %job.id(), image = %input.image, "simulated image classification");

        Ok(json!({
            "image": input.image,
            "label": self.label,
            "confidence": self.confidence,
            "simulated": true,
        }))
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use mlqueue_core::{Job, JobType};

use crate::handler::{HandlerError, JobHandler, parse_input};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationInput {
    pub features: Vec<f64>,
}

/// Deterministic binary classifier over a numeric feature vector.
///
/// Model:
/// - Linear score `w · x + b` squashed through the logistic function.
/// - Predict `1` when the probability reaches `threshold`, else `0`.
/// - With no explicit weights every feature has weight `1.0`.
#[derive(Debug, Clone)]
pub struct ClassificationHandler {
    weights: Vec<f64>,
    bias: f64,
    threshold: f64,
}

impl Default for ClassificationHandler {
    fn default() -> Self {
        Self {
            weights: Vec::new(),
            bias: 0.0,
            threshold: 0.5,
        }
    }
}

impl ClassificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(mut self, weights: Vec<f64>, bias: f64) -> Self {
        self.weights = weights;
        self.bias = bias;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn predict(&self, input: &ClassificationInput) -> Result<(u8, f64), HandlerError> {
        if input.features.is_empty() {
            return Err(HandlerError::InvalidInput(
                "features must not be empty".to_string(),
            ));
        }
        if input.features.iter().any(|f| !f.is_finite()) {
            return Err(HandlerError::InvalidInput(
                "features must be finite numbers".to_string(),
            ));
        }
        if !self.weights.is_empty() && self.weights.len() != input.features.len() {
            return Err(HandlerError::InvalidInput(format!(
                "expected {} features, got {}",
                self.weights.len(),
                input.features.len()
            )));
        }

        let linear: f64 = if self.weights.is_empty() {
            input.features.iter().sum::<f64>() + self.bias
        } else {
            self.weights
                .iter()
                .zip(&input.features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
                + self.bias
        };

        let probability = 1.0 / (1.0 + (-linear).exp());
        if !probability.is_finite() {
            return Err(HandlerError::InferenceFailed(
                "score is not a finite number".to_string(),
            ));
        }

        let prediction = if probability >= self.threshold { 1 } else { 0 };
        Ok((prediction, probability))
    }
}

impl JobHandler for ClassificationHandler {
    fn job_type(&self) -> JobType {
        JobType::Classification
    }

    fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        let input: ClassificationInput = parse_input(job)?;
        let (prediction, probability) = self.predict(&input)?;

        Ok(json!({
            "prediction": prediction,
            "probability": probability,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(payload: JsonValue) -> Job {
        Job::new(
            "c1",
            JobType::Classification,
            payload.as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn positive_features_predict_one() {
        let out = ClassificationHandler::new()
            .handle(&job(json!({"features": [1, 2, 3]})))
            .unwrap();
        assert_eq!(out["prediction"], 1);
        assert!(out["probability"].as_f64().unwrap() > 0.99);
    }

    #[test]
    fn weights_and_bias_shift_the_decision() {
        let handler = ClassificationHandler::new().with_weights(vec![-1.0, -1.0], 0.5);
        let out = handler.handle(&job(json!({"features": [1.0, 1.0]}))).unwrap();
        assert_eq!(out["prediction"], 0);
    }

    #[test]
    fn rejects_bad_inputs() {
        let handler = ClassificationHandler::new();
        assert!(matches!(
            handler.handle(&job(json!({"features": []}))),
            Err(HandlerError::InvalidInput(_))
        ));
        assert!(matches!(
            handler.handle(&job(json!({"values": [1]}))),
            Err(HandlerError::InvalidInput(_))
        ));

        let weighted = ClassificationHandler::new().with_weights(vec![1.0, 2.0, 3.0], 0.0);
        assert!(matches!(
            weighted.handle(&job(json!({"features": [1.0]}))),
            Err(HandlerError::InvalidInput(m)) if m.contains("expected 3 features")
        ));
    }
}

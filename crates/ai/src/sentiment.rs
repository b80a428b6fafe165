use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use mlqueue_core::{Job, JobType};

use crate::handler::{HandlerError, JobHandler, parse_input};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentInput {
    pub text: String,
}

const POSITIVE: &[&str] = &[
    "good", "great", "excellent", "amazing", "love", "happy", "wonderful", "best", "fantastic",
    "nice", "awesome", "recommend",
];

const NEGATIVE: &[&str] = &[
    "bad", "terrible", "awful", "hate", "worst", "poor", "horrible", "disappointed", "broken",
    "sad", "useless", "refund",
];

/// Lexicon-based sentiment scorer.
///
/// Counts positive and negative cue words; confidence grows with the margin
/// between the two counts and is capped below certainty.
#[derive(Debug, Clone, Default)]
pub struct SentimentHandler;

impl SentimentHandler {
    pub fn new() -> Self {
        Self
    }

    fn score(text: &str) -> (&'static str, f64) {
        let (mut pos, mut neg) = (0usize, 0usize);
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            if POSITIVE.contains(&word.as_str()) {
                pos += 1;
            } else if NEGATIVE.contains(&word.as_str()) {
                neg += 1;
            }
        }

        let total = pos + neg;
        if total == 0 || pos == neg {
            return ("neutral", 0.5);
        }

        let margin = pos.abs_diff(neg) as f64 / total as f64;
        let confidence = (0.5 + margin / 2.0).min(0.99);
        if pos > neg {
            ("positive", confidence)
        } else {
            ("negative", confidence)
        }
    }
}

impl JobHandler for SentimentHandler {
    fn job_type(&self) -> JobType {
        JobType::SentimentAnalysis
    }

    fn handle(&self, job: &Job) -> Result<JsonValue, HandlerError> {
        let input: SentimentInput = parse_input(job)?;
        if input.text.trim().is_empty() {
            return Err(HandlerError::InvalidInput("text cannot be empty".to_string()));
        }

        let (sentiment, confidence) = Self::score(&input.text);
        Ok(json!({
            "text": input.text,
            "sentiment": sentiment,
            "confidence": confidence,
        }))
    }
}

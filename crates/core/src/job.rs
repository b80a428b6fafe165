//! The immutable job value and its flat wire encoding.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::error::MalformedJobError;
use crate::id::JobId;

/// Task-specific input: a flat bag of JSON key/value pairs.
pub type Payload = Map<String, JsonValue>;

/// Closed set of job kinds known to workers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Numeric feature vector -> class label.
    Classification,
    /// Free text -> positive/negative/neutral.
    SentimentAnalysis,
    /// Image reference -> label.
    ImageClassification,
}

impl JobType {
    pub const ALL: [JobType; 3] = [
        JobType::Classification,
        JobType::SentimentAnalysis,
        JobType::ImageClassification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Classification => "classification",
            JobType::SentimentAnalysis => "sentiment_analysis",
            JobType::ImageClassification => "image_classification",
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = MalformedJobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MalformedJobError::invalid("type", format!("unknown job type `{s}`")))
    }
}

/// Which live structure a job is pushed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lane {
    Fifo,
    Priority,
}

/// One unit of deferred work.
///
/// Immutable after construction: retries produce a new value through
/// [`Job::with_incremented_attempts`].
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    job_type: JobType,
    payload: Payload,
    priority: u32,
    attempts: u32,
    created_at: DateTime<Utc>,
}

impl Job {
    /// Create a FIFO-lane job with zero attempts, stamped with the current time.
    pub fn new(id: impl Into<JobId>, job_type: JobType, payload: Payload) -> Self {
        Self {
            id: id.into(),
            job_type,
            payload,
            priority: 0,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// `0` keeps the job in the FIFO lane; higher values are dequeued first.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Override the creation timestamp (replay and tests).
    pub fn created_at_time(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lane(&self) -> Lane {
        if self.priority > 0 {
            Lane::Priority
        } else {
            Lane::Fifo
        }
    }

    /// Copy of this job with `attempts + 1`. The receiver is left untouched.
    pub fn with_incremented_attempts(&self) -> Job {
        Job {
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        }
    }

    /// Encode as a flat JSON document.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decode a document produced by [`Job::encode`] (or any producer using the
    /// same field names). Field order is irrelevant.
    pub fn decode(raw: &str) -> Result<Job, MalformedJobError> {
        let value: JsonValue = serde_json::from_str(raw)
            .map_err(|e| MalformedJobError::invalid("<root>", e.to_string()))?;
        Job::from_value(value)
    }

    pub fn to_value(&self) -> JsonValue {
        let mut doc = Map::new();
        doc.insert("id".to_string(), JsonValue::String(self.id.to_string()));
        doc.insert("type".to_string(), JsonValue::String(self.job_type.as_str().to_string()));
        doc.insert("payload".to_string(), JsonValue::Object(self.payload.clone()));
        doc.insert("priority".to_string(), JsonValue::from(self.priority));
        doc.insert("attempts".to_string(), JsonValue::from(self.attempts));
        doc.insert(
            "created_at".to_string(),
            JsonValue::String(self.created_at.to_rfc3339()),
        );
        JsonValue::Object(doc)
    }

    pub fn from_value(value: JsonValue) -> Result<Job, MalformedJobError> {
        let JsonValue::Object(mut doc) = value else {
            return Err(MalformedJobError::invalid("<root>", "expected a JSON object"));
        };

        let id = match doc.remove("id") {
            Some(JsonValue::String(s)) => s.parse::<JobId>()?,
            Some(_) => return Err(MalformedJobError::invalid("id", "expected a string")),
            None => return Err(MalformedJobError::missing("id")),
        };

        let job_type = match doc.remove("type") {
            Some(JsonValue::String(s)) => s.parse::<JobType>()?,
            Some(_) => return Err(MalformedJobError::invalid("type", "expected a string")),
            None => return Err(MalformedJobError::missing("type")),
        };

        let payload = match doc.remove("payload") {
            Some(JsonValue::Object(map)) => map,
            Some(_) => return Err(MalformedJobError::invalid("payload", "expected an object")),
            None => return Err(MalformedJobError::missing("payload")),
        };

        let priority = optional_u32(&mut doc, "priority")?;
        let attempts = optional_u32(&mut doc, "attempts")?;

        let created_at = match doc.remove("created_at") {
            Some(JsonValue::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map_err(|e| MalformedJobError::invalid("created_at", e.to_string()))?
                .with_timezone(&Utc),
            Some(JsonValue::Null) | None => Utc::now(),
            Some(_) => {
                return Err(MalformedJobError::invalid(
                    "created_at",
                    "expected an RFC 3339 string",
                ));
            }
        };

        Ok(Job {
            id,
            job_type,
            payload,
            priority,
            attempts,
            created_at,
        })
    }
}

fn optional_u32(doc: &mut Map<String, JsonValue>, field: &str) -> Result<u32, MalformedJobError> {
    match doc.remove(field) {
        None | Some(JsonValue::Null) => Ok(0),
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| MalformedJobError::invalid(field, "expected a non-negative integer")),
        Some(_) => Err(MalformedJobError::invalid(field, "expected a number")),
    }
}

impl Serialize for Job {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Job {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Job::from_value(value).map_err(serde::de::Error::custom)
    }
}

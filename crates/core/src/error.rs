//! Decoding error model.

use thiserror::Error;

/// A job document could not be decoded.
///
/// Always names the offending field so operators can fix the producer.
/// Decoding failures are permanent: the same bytes will never decode later.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed job: field `{field}`: {reason}")]
pub struct MalformedJobError {
    field: String,
    reason: String,
}

impl MalformedJobError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: "missing".to_string(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the missing or invalid field (`<root>` for the document itself).
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

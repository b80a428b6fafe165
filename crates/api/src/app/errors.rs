use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use mlqueue_core::MalformedJobError;
use mlqueue_infra::StoreError;

/// Route-level failures and their HTTP mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Malformed(#[from] MalformedJobError),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Malformed(err) => (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({
                    "error": "malformed_job",
                    "field": err.field(),
                    "message": err.to_string(),
                })),
            )
                .into_response(),
            ApiError::NotFound(what) => {
                json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
            }
            ApiError::Store(err) => {
                tracing::error!(error = %err, "store unavailable");
                json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", err.to_string())
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// 200 when healthy, 503 when degraded; the body is the report either way.
pub async fn health(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = services.blocking(|s| Ok(s.health()?)).await?;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)))
}

pub async fn metrics(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = services.blocking(|s| Ok(s.metrics()?)).await?;
    Ok(Json(snapshot))
}

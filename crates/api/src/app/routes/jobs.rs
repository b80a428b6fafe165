use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value as JsonValue;
use tracing::info;

use mlqueue_core::{JobId, JobStatus};

use crate::app::dto::{self, FailedQuery, JobView, SubmitJobResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_job))
        .route("/failed", get(list_failed))
        .route("/:id", get(get_job))
        .route("/:id/result", get(get_job_result))
}

pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<JsonValue>,
) -> Result<impl IntoResponse, ApiError> {
    let job = dto::job_from_request(body)?;
    let job = services
        .blocking(move |s| {
            s.submit(&job)?;
            Ok(job)
        })
        .await?;

    info!(
        job_id = %job.id(),
        job_type = %job.job_type(),
        priority = job.priority(),
        "job accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id().clone(),
            status: JobStatus::Queued,
            priority: job.priority(),
        }),
    ))
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let id = JobId::from(id);
    let view = services
        .blocking(move |s| {
            let status = s
                .status(&id)?
                .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;
            let result = match status.status {
                JobStatus::Completed => s.result(&id)?,
                _ => None,
            };
            Ok(JobView { status, result })
        })
        .await?;
    Ok(Json(view))
}

pub async fn get_job_result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = JobId::from(id);
    let record = services
        .blocking(move |s| {
            s.result(&id)?
                .ok_or_else(|| ApiError::NotFound(format!("result for job {id}")))
        })
        .await?;
    Ok(Json(record))
}

pub async fn list_failed(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<FailedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit();
    let failed = services.blocking(move |s| Ok(s.failed(limit)?)).await?;
    Ok(Json(failed))
}

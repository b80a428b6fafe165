use axum::{Router, routing::get};

pub mod jobs;
pub mod system;

/// Router for every endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .nest("/jobs", jobs::router())
}

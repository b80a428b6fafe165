use std::sync::Arc;

use anyhow::Context;

use mlqueue_api::app::{AppServices, build_app};
use mlqueue_infra::StoreConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mlqueue_observability::init();

    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let store = StoreConfig::from_env();
    let services = AppServices::from_config(&store)
        .with_context(|| format!("connecting to {:?} backend", store.backend))?;

    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, backend = ?store.backend, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

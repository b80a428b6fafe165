use anyhow::Context;

use mlqueue_worker::{HandlerRegistry, Worker, WorkerConfig, shutdown};

fn main() -> anyhow::Result<()> {
    mlqueue_observability::init();

    let config = WorkerConfig::from_env();
    let backends = config
        .store
        .connect()
        .with_context(|| format!("connecting to {:?} backend", config.store.backend))?;
    tracing::info!(
        worker = %config.worker_id,
        backend = ?config.store.backend,
        queue = %config.store.queue_name,
        "backends ready"
    );

    let token = shutdown::install().context("installing signal handlers")?;

    let mut worker = Worker::new(
        config,
        backends.queue,
        backends.kv,
        HandlerRegistry::with_default_models(),
    );
    let stats = worker.run(&token);

    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        dead_lettered = stats.dead_lettered,
        infra_errors = stats.infra_errors,
        "shutdown complete"
    );
    Ok(())
}

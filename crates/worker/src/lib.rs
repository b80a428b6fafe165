//! `mlqueue-worker`
//!
//! **Responsibility:** the job-processing loop.
//!
//! - Claims jobs from a [`mlqueue_infra::JobQueue`], one at a time.
//! - Dispatches by job type through a [`HandlerRegistry`].
//! - Stores results, publishes status/metrics, and routes failures to retry.
//! - Stops cooperatively between jobs when its cancellation token fires.

pub mod config;
pub mod registry;
pub mod shutdown;
pub mod worker;

pub use config::WorkerConfig;
pub use registry::HandlerRegistry;
pub use worker::{Outcome, Worker, WorkerState, WorkerStats};

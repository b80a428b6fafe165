//! HTTP API: job submission, status/result lookup, health and metrics.

pub mod app;
pub mod middleware;

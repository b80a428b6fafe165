//! `mlqueue-core`: job model shared by producers, queues and workers.
//!
//! This crate contains **pure value types** (no IO, no storage assumptions):
//! the immutable [`Job`], its flat wire encoding, and the status/result records
//! that workers publish for each job id.

pub mod error;
pub mod id;
pub mod job;
pub mod record;

pub use error::MalformedJobError;
pub use id::JobId;
pub use job::{Job, JobType, Lane, Payload};
pub use record::{JobStatus, ResultRecord, StatusRecord};

//! `mlqueue-ai`
//!
//! **Responsibility:** inference handlers executed by workers.
//!
//! Handlers are pure with respect to the queue:
//! - They never touch queue or store state.
//! - They turn a job payload into a result document, or an error.
//! - Retries, result storage and failure bookkeeping belong to the worker.

pub mod classification;
pub mod handler;
pub mod image;
pub mod sentiment;

pub use classification::{ClassificationHandler, ClassificationInput};
pub use handler::{HandlerError, JobHandler};
pub use image::{ImageClassificationHandler, ImageInput};
pub use sentiment::{SentimentHandler, SentimentInput};

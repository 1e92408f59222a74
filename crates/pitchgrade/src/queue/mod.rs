//! Evaluation job queue: persistence-backed store, worker loop, and
//! retry policy.

use thiserror::Error;

pub mod job;
pub mod store;
pub mod worker;

pub use job::{next_delay, EvaluationJob, JobStatus, DEFAULT_BACKOFF_SCHEDULE};
pub use store::{EvaluationQueue, QueueStatus};
pub use worker::EvalWorker;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

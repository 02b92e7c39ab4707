//! Batch classification jobs.
//!
//! `JobTracker` holds job progress in memory; `BatchRunner` walks the file
//! list in order and records one result or error per file.

pub mod jobs;
pub mod runner;

pub use jobs::*;
pub use runner::*;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Batch job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Batch job already completed: {0}")]
    AlreadyCompleted(Uuid),

    #[error("Batch job {id} already holds all {total} results")]
    JobFull { id: Uuid, total: usize },

    #[error("Job tracker lock poisoned")]
    LockPoisoned,
}

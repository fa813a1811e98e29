use thiserror::Error;

use crate::lifecycle::JobStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The handle already exists, or another job is already in flight.
    #[error("scoring job {handle} conflicts with an existing job")]
    DuplicateJob { handle: String },
    #[error("scoring job {0} not found")]
    JobNotFound(String),
    /// Compare-and-set lost: the stored status is not the expected one.
    #[error("scoring job {handle} is {actual}, expected {expected}")]
    StatusConflict {
        handle: String,
        expected: JobStatus,
        actual: JobStatus,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

//! Batch lifecycle: the job state machine, the idempotent score writer and
//! the manager that drives one pass per trigger.

pub mod manager;
pub mod state;
pub mod updater;

use thiserror::Error;

pub use manager::{
    ActiveJobOutcome, BatchLifecycleManager, CreateOutcome, IngestOutcome, LifecycleSettings,
    PassReport, StatusReport,
};
pub use state::{InvalidTransition, JobStatus, LifecycleState};
pub use updater::{ApplyReport, FailedUpdate, IdempotentBulkUpdater, UpdateError};

use crate::clients::ScoringServiceError;
use crate::scoring::BatchParseFailure;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scoring(#[from] ScoringServiceError),
    #[error(transparent)]
    Parse(#[from] BatchParseFailure),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("batch {handle} returned no results for {expected} submitted records")]
    EmptyResults { handle: String, expected: i32 },
    #[error("scoring job {handle} is still in flight")]
    JobInFlight { handle: String },
}

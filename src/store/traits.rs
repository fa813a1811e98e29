use std::collections::HashSet;

use async_trait::async_trait;

use super::{
    error::StoreError,
    models::{Record, ScoringJob},
};
use crate::lifecycle::JobStatus;
use crate::scoring::{RecordId, ScoreUpdate};

/// Records awaiting or holding a clickbait score.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Unscored records, oldest first, at most `limit`.
    async fn fetch_unscored(&self, limit: usize) -> Result<Vec<Record>, StoreError>;

    async fn count_unscored(&self) -> Result<u64, StoreError>;

    /// Write score and explanation together.
    ///
    /// Returns `false` when the record does not exist or already carries a
    /// score; an existing score is never overwritten.
    async fn apply_score(&self, update: &ScoreUpdate) -> Result<bool, StoreError>;

    /// Which of `ids` already carry a score.
    async fn query_scored_status(&self, ids: &[RecordId])
    -> Result<HashSet<RecordId>, StoreError>;
}

/// Scoring jobs keyed by their external handle.
///
/// Implementations admit at most one job in a non-terminal status.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Non-terminal jobs, oldest first.
    async fn find_non_terminal(&self) -> Result<Vec<ScoringJob>, StoreError>;

    async fn find_by_handle(&self, handle: &str) -> Result<Option<ScoringJob>, StoreError>;

    /// Persist a new job.
    ///
    /// Fails with [`StoreError::DuplicateJob`] when the handle exists or when
    /// the job is non-terminal and another non-terminal job exists.
    async fn insert(&self, job: &ScoringJob) -> Result<(), StoreError>;

    /// Compare-and-set the status of `handle` from `expected` to `to`.
    ///
    /// Entering a terminal status stamps `completed_at`; returning to
    /// `Pending` clears it together with the error message. A supplied
    /// `error` replaces the stored message.
    async fn update_status(
        &self,
        handle: &str,
        expected: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<ScoringJob, StoreError>;

    /// Most recent jobs first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<ScoringJob>, StoreError>;
}

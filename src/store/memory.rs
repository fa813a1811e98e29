//! In-process stores with the same constraints as the Postgres ones.
//!
//! Used by tests and for dry runs. Faults can be injected per record or for
//! the whole store.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    error::StoreError,
    models::{Record, ScoringJob},
    traits::{JobStore, RecordStore},
};
use crate::lifecycle::JobStatus;
use crate::scoring::{RecordId, ScoreUpdate};

#[derive(Debug, Default)]
struct RecordState {
    records: Vec<Record>,
    failing_writes: HashSet<RecordId>,
    unavailable: bool,
    apply_calls: usize,
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: Mutex<RecordState>,
}

impl MemoryRecordStore {
    /// Records are returned by `fetch_unscored` in the order given.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            inner: Mutex::new(RecordState {
                records: records.into_iter().collect(),
                ..RecordState::default()
            }),
        }
    }

    pub async fn get(&self, id: RecordId) -> Option<Record> {
        let state = self.inner.lock().await;
        state.records.iter().find(|r| r.id == id).cloned()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.inner.lock().await.records.clone()
    }

    /// Make every `apply_score` for `id` fail.
    pub async fn fail_writes_for(&self, id: RecordId) {
        self.inner.lock().await.failing_writes.insert(id);
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    /// Number of `apply_score` calls that reached the store.
    pub async fn apply_calls(&self) -> usize {
        self.inner.lock().await.apply_calls
    }
}

fn check_available(unavailable: bool) -> Result<(), StoreError> {
    if unavailable {
        Err(StoreError::Unavailable("memory store marked unavailable".to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_unscored(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let state = self.inner.lock().await;
        check_available(state.unavailable)?;
        Ok(state
            .records
            .iter()
            .filter(|r| !r.is_scored())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_unscored(&self) -> Result<u64, StoreError> {
        let state = self.inner.lock().await;
        check_available(state.unavailable)?;
        Ok(state.records.iter().filter(|r| !r.is_scored()).count() as u64)
    }

    async fn apply_score(&self, update: &ScoreUpdate) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().await;
        check_available(state.unavailable)?;
        state.apply_calls += 1;
        if state.failing_writes.contains(&update.record_id) {
            return Err(StoreError::Unavailable(format!(
                "write to record {} failed",
                update.record_id
            )));
        }
        let Some(record) = state.records.iter_mut().find(|r| r.id == update.record_id) else {
            return Ok(false);
        };
        if record.is_scored() {
            return Ok(false);
        }
        record.score = Some(update.score);
        record.explanation = Some(update.explanation.clone());
        record.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn query_scored_status(
        &self,
        ids: &[RecordId],
    ) -> Result<HashSet<RecordId>, StoreError> {
        let state = self.inner.lock().await;
        check_available(state.unavailable)?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.is_scored() && ids.contains(&r.id))
            .map(|r| r.id)
            .collect())
    }
}

#[derive(Debug, Default)]
struct JobState {
    jobs: Vec<ScoringJob>,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: Mutex<JobState>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with existing jobs; the single in-flight rule is not
    /// checked so corrupted states can be reproduced.
    #[must_use]
    pub fn with_jobs(jobs: impl IntoIterator<Item = ScoringJob>) -> Self {
        Self {
            inner: Mutex::new(JobState {
                jobs: jobs.into_iter().collect(),
                unavailable: false,
            }),
        }
    }

    pub async fn jobs(&self) -> Vec<ScoringJob> {
        self.inner.lock().await.jobs.clone()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn find_non_terminal(&self) -> Result<Vec<ScoringJob>, StoreError> {
        let state = self.inner.lock().await;
        check_available(state.unavailable)?;
        let mut jobs: Vec<_> = state
            .jobs
            .iter()
            .filter(|job| job.is_in_flight())
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<ScoringJob>, StoreError> {
        let state = self.inner.lock().await;
        check_available(state.unavailable)?;
        Ok(state.jobs.iter().find(|job| job.handle == handle).cloned())
    }

    async fn insert(&self, job: &ScoringJob) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        check_available(state.unavailable)?;
        let handle_taken = state.jobs.iter().any(|existing| existing.handle == job.handle);
        let slot_taken =
            job.is_in_flight() && state.jobs.iter().any(ScoringJob::is_in_flight);
        if handle_taken || slot_taken {
            return Err(StoreError::DuplicateJob {
                handle: job.handle.clone(),
            });
        }
        state.jobs.push(job.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        handle: &str,
        expected: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<ScoringJob, StoreError> {
        let mut state = self.inner.lock().await;
        check_available(state.unavailable)?;
        let other_in_flight = state
            .jobs
            .iter()
            .any(|job| job.handle != handle && job.is_in_flight());
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.handle == handle)
            .ok_or_else(|| StoreError::JobNotFound(handle.to_string()))?;

        if job.status != expected {
            return Err(StoreError::StatusConflict {
                handle: handle.to_string(),
                expected,
                actual: job.status,
            });
        }
        // Only a move out of a terminal status claims the in-flight slot.
        if expected.is_terminal() && !to.is_terminal() && other_in_flight {
            return Err(StoreError::DuplicateJob {
                handle: handle.to_string(),
            });
        }

        job.status = to;
        if to == JobStatus::Pending {
            job.error_message = None;
            job.completed_at = None;
        } else {
            if let Some(error) = error {
                job.error_message = Some(error.to_string());
            }
            if to.is_terminal() && job.completed_at.is_none() {
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(job.clone())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ScoringJob>, StoreError> {
        let state = self.inner.lock().await;
        check_available(state.unavailable)?;
        let mut jobs = state.jobs.clone();
        jobs.sort_by_key(|job| std::cmp::Reverse(job.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use prometheus::Registry;
use tokio::sync::Mutex;

use clickscore_worker::{
    clients::{BatchProgress, JobHandle, RemoteBatch, RemoteStatus, ScoringService, ScoringServiceError},
    lifecycle::{BatchLifecycleManager, LifecycleSettings},
    observability::Metrics,
    scoring::{RawResult, RecordId, ScoreRequest},
    store::{
        JobStore, Record, ScoringJob,
        memory::{MemoryJobStore, MemoryRecordStore},
    },
};

#[derive(Default)]
struct FakeState {
    submissions: Vec<(String, Vec<ScoreRequest>)>,
    statuses: HashMap<String, RemoteStatus>,
    errors: HashMap<String, String>,
    results: HashMap<String, Vec<RawResult>>,
    cancelled: Vec<String>,
    fetches: usize,
    polls_fail: bool,
    race: Option<(Arc<MemoryJobStore>, ScoringJob)>,
    yield_on_submit: bool,
}

/// Scripted scoring service.
///
/// Batches are named `batch_1`, `batch_2`, ... in submission order and start
/// out `Pending`.
#[derive(Default)]
pub struct FakeScoringService {
    state: Mutex<FakeState>,
}

impl FakeScoringService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn set_status(&self, handle: &str, status: RemoteStatus) {
        self.state
            .lock()
            .await
            .statuses
            .insert(handle.to_string(), status);
    }

    pub async fn fail_remotely(&self, handle: &str, error: &str) {
        let mut state = self.state.lock().await;
        state.statuses.insert(handle.to_string(), RemoteStatus::Failed);
        state.errors.insert(handle.to_string(), error.to_string());
    }

    pub async fn complete_with(&self, handle: &str, results: Vec<RawResult>) {
        let mut state = self.state.lock().await;
        state.statuses.insert(handle.to_string(), RemoteStatus::Completed);
        state.results.insert(handle.to_string(), results);
    }

    pub async fn fail_polls(&self, fail: bool) {
        self.state.lock().await.polls_fail = fail;
    }

    /// On the next submit, `job` is inserted into `store` first, as if
    /// another process had won the creation race.
    pub async fn race_with(&self, store: Arc<MemoryJobStore>, job: ScoringJob) {
        self.state.lock().await.race = Some((store, job));
    }

    pub async fn yield_on_submit(&self) {
        self.state.lock().await.yield_on_submit = true;
    }

    pub async fn submissions(&self) -> Vec<(String, Vec<ScoreRequest>)> {
        self.state.lock().await.submissions.clone()
    }

    pub async fn cancelled(&self) -> Vec<String> {
        self.state.lock().await.cancelled.clone()
    }

    pub async fn fetches(&self) -> usize {
        self.state.lock().await.fetches
    }
}

#[async_trait]
impl ScoringService for FakeScoringService {
    async fn submit(&self, requests: &[ScoreRequest]) -> Result<JobHandle, ScoringServiceError> {
        let (handle, race, yield_now) = {
            let mut state = self.state.lock().await;
            let handle = format!("batch_{}", state.submissions.len() + 1);
            state.submissions.push((handle.clone(), requests.to_vec()));
            state.statuses.insert(handle.clone(), RemoteStatus::Pending);
            (handle, state.race.take(), state.yield_on_submit)
        };
        if let Some((store, job)) = race {
            store.insert(&job).await.expect("racing insert");
        }
        if yield_now {
            tokio::task::yield_now().await;
        }
        Ok(handle)
    }

    async fn get_status(&self, handle: &str) -> Result<RemoteBatch, ScoringServiceError> {
        let state = self.state.lock().await;
        if state.polls_fail {
            return Err(ScoringServiceError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        let status = state.statuses.get(handle).copied().ok_or_else(|| ScoringServiceError::Api {
            status: 404,
            body: format!("no batch {handle}"),
        })?;
        Ok(RemoteBatch {
            handle: handle.to_string(),
            status,
            raw_status: status.to_string(),
            progress: BatchProgress::default(),
            created_at: None,
            error: state.errors.get(handle).cloned(),
        })
    }

    async fn fetch_results(&self, handle: &str) -> Result<Vec<RawResult>, ScoringServiceError> {
        let mut state = self.state.lock().await;
        state.fetches += 1;
        match state.statuses.get(handle) {
            Some(RemoteStatus::Completed) => {
                Ok(state.results.get(handle).cloned().unwrap_or_default())
            }
            other => Err(ScoringServiceError::ResultsUnavailable {
                handle: handle.to_string(),
                status: other.map_or_else(|| "unknown".to_string(), ToString::to_string),
            }),
        }
    }

    async fn cancel(&self, handle: &str) -> Result<(), ScoringServiceError> {
        let mut state = self.state.lock().await;
        state.cancelled.push(handle.to_string());
        state.statuses.insert(handle.to_string(), RemoteStatus::Cancelled);
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<RemoteBatch>, ScoringServiceError> {
        let handles: Vec<String> = {
            let state = self.state.lock().await;
            state.submissions.iter().rev().take(limit).map(|(h, _)| h.clone()).collect()
        };
        let mut batches = Vec::with_capacity(handles.len());
        for handle in handles {
            batches.push(self.get_status(&handle).await?);
        }
        Ok(batches)
    }
}

pub fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new(&Registry::new()).expect("metrics"))
}

pub fn articles(ids: impl IntoIterator<Item = RecordId>) -> Arc<MemoryRecordStore> {
    Arc::new(MemoryRecordStore::new(ids.into_iter().map(|id| {
        Record::new(id, format!("제목 {id}"), format!("본문 {id}"))
    })))
}

pub fn scored_line(id: RecordId, score: i64) -> RawResult {
    RawResult::with_content(
        format!("article_{id}"),
        &format!(r#"{{"clickbait_score": {score}, "clickbait_explanation": "근거 {id}"}}"#),
    )
}

pub struct Harness {
    pub scoring: Arc<FakeScoringService>,
    pub records: Arc<MemoryRecordStore>,
    pub jobs: Arc<MemoryJobStore>,
    pub manager: BatchLifecycleManager,
}

impl Harness {
    pub fn new(records: Arc<MemoryRecordStore>, jobs: Arc<MemoryJobStore>) -> Self {
        Self::with_settings(records, jobs, LifecycleSettings::default())
    }

    pub fn with_settings(
        records: Arc<MemoryRecordStore>,
        jobs: Arc<MemoryJobStore>,
        settings: LifecycleSettings,
    ) -> Self {
        let scoring = FakeScoringService::new();
        let manager = BatchLifecycleManager::new(
            scoring.clone(),
            records.clone(),
            jobs.clone(),
            settings,
            metrics(),
        );
        Self {
            scoring,
            records,
            jobs,
            manager,
        }
    }

    pub async fn job(&self, handle: &str) -> ScoringJob {
        self.jobs
            .find_by_handle(handle)
            .await
            .expect("job store")
            .expect("job exists")
    }
}

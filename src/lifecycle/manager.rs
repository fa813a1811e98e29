use std::{num::NonZeroUsize, sync::Arc, time::Instant};

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::{
    LifecycleError,
    state::{InvalidTransition, JobStatus, LifecycleState},
    updater::{ApplyReport, IdempotentBulkUpdater},
};
use crate::clients::{BatchProgress, RemoteBatch, RemoteStatus, ScoringService};
use crate::config::Config;
use crate::observability::Metrics;
use crate::scoring::{ParsePolicy, PromptBuilder, ResultParser, ScoreValidator};
use crate::store::{JobStore, Record, RecordStore, ScoringJob, StoreError};
use crate::util::text::truncate_error_message;

/// Tunables of the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub fetch_limit: NonZeroUsize,
    /// Fewer unscored records than this and no batch is created.
    pub min_batch_records: usize,
    pub max_score: i32,
    pub explanation_max_chars: usize,
    pub prompt_body_max_chars: usize,
    pub parse_policy: ParsePolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            fetch_limit: NonZeroUsize::new(800).unwrap_or(NonZeroUsize::MIN),
            min_batch_records: 1,
            max_score: 100,
            explanation_max_chars: 500,
            prompt_body_max_chars: 700,
            parse_policy: ParsePolicy::Strict,
        }
    }
}

impl LifecycleSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_limit: config.fetch_limit(),
            min_batch_records: config.min_batch_records(),
            max_score: config.score_max(),
            explanation_max_chars: config.explanation_max_chars(),
            prompt_body_max_chars: config.prompt_body_max_chars(),
            parse_policy: config.parse_policy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Ingested { handle: String, report: ApplyReport },
    /// The stored job was already completed; nothing was downloaded.
    AlreadyCompleted { handle: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateOutcome {
    Created(ScoringJob),
    /// The pre-check found a job in flight; nothing was submitted.
    AnotherJobInFlight(ScoringJob),
    /// Lost the insert race; the winner's job is returned.
    JoinedExisting(ScoringJob),
    NotEnoughRecords { available: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveJobOutcome {
    StillRunning {
        handle: String,
        status: JobStatus,
        progress: BatchProgress,
    },
    Ingested(IngestOutcome),
    IngestFailed { handle: String, error: String },
    RemoteFailed { handle: String, error: Option<String> },
    RemoteCancelled { handle: String },
}

impl ActiveJobOutcome {
    fn still_in_flight(&self) -> bool {
        matches!(self, Self::StillRunning { .. })
    }
}

/// What one [`BatchLifecycleManager::run_once`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub active: Option<ActiveJobOutcome>,
    pub creation: Option<CreateOutcome>,
    /// Set when a fault ended the pass early; the next trigger retries.
    pub deferred: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub state: LifecycleState,
    pub active: Option<ScoringJob>,
    pub remote: Option<RemoteBatch>,
    pub unscored: Option<u64>,
    pub recent: Vec<ScoringJob>,
    /// Most recent batches as listed by the scoring service.
    pub remote_recent: Vec<RemoteBatch>,
}

/// Creates scoring jobs, follows them at the scoring service and ingests
/// their results exactly once.
///
/// Holds no state of its own: every pass starts from what the job and record
/// stores say, so independent processes can share the same stores.
pub struct BatchLifecycleManager {
    scoring: Arc<dyn ScoringService>,
    records: Arc<dyn RecordStore>,
    jobs: Arc<dyn JobStore>,
    prompts: PromptBuilder,
    parser: ResultParser,
    updater: IdempotentBulkUpdater,
    settings: LifecycleSettings,
    metrics: Arc<Metrics>,
}

impl BatchLifecycleManager {
    #[must_use]
    pub fn new(
        scoring: Arc<dyn ScoringService>,
        records: Arc<dyn RecordStore>,
        jobs: Arc<dyn JobStore>,
        settings: LifecycleSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let validator = ScoreValidator::new(settings.max_score, settings.explanation_max_chars);
        Self {
            prompts: PromptBuilder::new(settings.max_score, settings.prompt_body_max_chars),
            parser: ResultParser::new(validator, settings.parse_policy),
            updater: IdempotentBulkUpdater::new(Arc::clone(&records), Arc::clone(&metrics)),
            scoring,
            records,
            jobs,
            settings,
            metrics,
        }
    }

    /// The oldest non-terminal job, if any.
    ///
    /// More than one non-terminal job violates the single in-flight rule; it
    /// is logged and left alone.
    ///
    /// # Errors
    /// Propagates job store failures.
    pub async fn find_active_job(&self) -> Result<Option<ScoringJob>, LifecycleError> {
        let jobs = self.jobs.find_non_terminal().await?;
        self.metrics.jobs_in_flight.set(as_metric(jobs.len()));
        if jobs.len() > 1 {
            let handles: Vec<&str> = jobs.iter().map(|job| job.handle.as_str()).collect();
            warn!(
                in_flight = jobs.len(),
                handles = ?handles,
                "more than one scoring job in flight; using the oldest"
            );
        }
        Ok(jobs.into_iter().next())
    }

    /// Ask the scoring service where `job` stands.
    ///
    /// # Errors
    /// A failure means the status is unknown, not that the job failed.
    pub async fn poll_job_status(&self, job: &ScoringJob) -> Result<RemoteBatch, LifecycleError> {
        match self.scoring.get_status(&job.handle).await {
            Ok(remote) => Ok(remote),
            Err(error) => {
                self.metrics.poll_errors.inc();
                warn!(batch_id = %job.handle, error = %error, "failed to poll scoring batch");
                Err(error.into())
            }
        }
    }

    /// Download, validate and apply the results of a completed job, then mark
    /// it `Completed`.
    ///
    /// Calling this again for a job that is already `Completed` returns
    /// [`IngestOutcome::AlreadyCompleted`] without touching the scoring
    /// service or the records.
    ///
    /// # Errors
    /// Any download, parse or write failure marks the job `Failed` with the
    /// error text and is returned.
    #[instrument(skip_all, fields(batch_id = %job.handle))]
    pub async fn ingest_completed_job(
        &self,
        job: &ScoringJob,
    ) -> Result<IngestOutcome, LifecycleError> {
        let current = self
            .jobs
            .find_by_handle(&job.handle)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(job.handle.clone()))?;

        let running = match current.status {
            JobStatus::Completed => {
                info!("scoring batch already ingested");
                return Ok(IngestOutcome::AlreadyCompleted {
                    handle: current.handle,
                });
            }
            JobStatus::Pending => self.transition(&current, JobStatus::InProgress, None).await?,
            JobStatus::InProgress => current,
            JobStatus::Failed | JobStatus::Cancelled => {
                let invalid = InvalidTransition {
                    from: current.status,
                    to: JobStatus::Completed,
                };
                warn!(error = %invalid, "refusing to ingest a terminated scoring batch");
                return Err(invalid.into());
            }
        };

        let started = Instant::now();
        let result = self.ingest_results(&running).await;
        self.metrics
            .ingest_duration
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(report) => self.finish_ingest(&running, report).await,
            Err(ingest_error) => {
                let message = truncate_error_message(&ingest_error.to_string());
                error!(error = %message, "scoring batch ingestion failed");
                match self
                    .transition(&running, JobStatus::Failed, Some(&message))
                    .await
                {
                    Ok(_) => self.metrics.jobs_failed.inc(),
                    Err(mark_error) => {
                        warn!(error = %mark_error, "failed to mark scoring batch as failed");
                    }
                }
                Err(ingest_error)
            }
        }
    }

    async fn ingest_results(&self, job: &ScoringJob) -> Result<ApplyReport, LifecycleError> {
        let raw_results = self.scoring.fetch_results(&job.handle).await?;
        if raw_results.is_empty() && job.input_count > 0 {
            return Err(LifecycleError::EmptyResults {
                handle: job.handle.clone(),
                expected: job.input_count,
            });
        }

        let updates = self.parser.parse(&raw_results).inspect_err(|failure| {
            self.metrics
                .parse_failures
                .inc_by(as_metric(failure.errors.len()));
        })?;
        let rejected = raw_results.len() - updates.len();
        if rejected > 0 {
            self.metrics.parse_failures.inc_by(as_metric(rejected));
        }

        Ok(self.updater.apply(&updates).await?)
    }

    async fn finish_ingest(
        &self,
        job: &ScoringJob,
        report: ApplyReport,
    ) -> Result<IngestOutcome, LifecycleError> {
        match self.transition(job, JobStatus::Completed, None).await {
            Ok(_) => {}
            // Another process finished the same batch first.
            Err(LifecycleError::Store(StoreError::StatusConflict {
                actual: JobStatus::Completed,
                ..
            })) => {
                info!("scoring batch was completed concurrently");
                return Ok(IngestOutcome::AlreadyCompleted {
                    handle: job.handle.clone(),
                });
            }
            Err(error) => return Err(error),
        }

        self.metrics.jobs_completed.inc();
        info!(
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed.len(),
            "scoring batch completed"
        );
        Ok(IngestOutcome::Ingested {
            handle: job.handle.clone(),
            report,
        })
    }

    /// Submit `candidates` as a new job unless one is already in flight.
    ///
    /// When another process inserts its job between the pre-check and the
    /// insert, the stored job wins: it is returned as
    /// [`CreateOutcome::JoinedExisting`] and the batch submitted here is
    /// cancelled at the scoring service.
    ///
    /// # Errors
    /// Propagates submission and store failures.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn create_job(&self, candidates: &[Record]) -> Result<CreateOutcome, LifecycleError> {
        if let Some(active) = self.find_active_job().await? {
            info!(batch_id = %active.handle, "another scoring batch is in flight");
            return Ok(CreateOutcome::AnotherJobInFlight(active));
        }
        let required = self.settings.min_batch_records.max(1);
        if candidates.len() < required {
            return Ok(CreateOutcome::NotEnoughRecords {
                available: candidates.len(),
                required,
            });
        }

        let requests = self.prompts.build_all(candidates);
        let handle = self.scoring.submit(&requests).await?;
        let job = ScoringJob::new(handle, i32::try_from(requests.len()).unwrap_or(i32::MAX));

        match self.jobs.insert(&job).await {
            Ok(()) => {
                self.metrics.jobs_created.inc();
                self.metrics.jobs_in_flight.set(1.0);
                info!(batch_id = %job.handle, records = job.input_count, "scoring batch created");
                Ok(CreateOutcome::Created(job))
            }
            Err(StoreError::DuplicateJob { .. }) => {
                self.metrics.duplicate_job_races.inc();
                self.resolve_duplicate(&job).await
            }
            Err(store_error) => {
                self.cancel_orphan(&job.handle).await;
                Err(store_error.into())
            }
        }
    }

    async fn resolve_duplicate(&self, job: &ScoringJob) -> Result<CreateOutcome, LifecycleError> {
        if let Some(same) = self.jobs.find_by_handle(&job.handle).await? {
            return Ok(CreateOutcome::JoinedExisting(same));
        }

        self.cancel_orphan(&job.handle).await;
        match self.find_active_job().await? {
            Some(existing) => {
                warn!(
                    batch_id = %job.handle,
                    winner = %existing.handle,
                    "lost scoring batch creation race"
                );
                Ok(CreateOutcome::JoinedExisting(existing))
            }
            None => Err(StoreError::DuplicateJob {
                handle: job.handle.clone(),
            }
            .into()),
        }
    }

    async fn cancel_orphan(&self, handle: &str) {
        match self.scoring.cancel(handle).await {
            Ok(()) => info!(batch_id = %handle, "cancelled orphaned scoring batch"),
            Err(error) => warn!(
                batch_id = %handle,
                error = %error,
                "failed to cancel orphaned scoring batch"
            ),
        }
    }

    /// One pass: follow the active job, then create a new one if nothing is
    /// in flight anymore.
    ///
    /// Never fails; faults are logged and reported in
    /// [`PassReport::deferred`] for the next trigger to retry.
    pub async fn run_once(&self) -> PassReport {
        let started = Instant::now();
        let mut report = PassReport::default();
        if let Err(error) = self.drive(&mut report).await {
            warn!(error = %error, "lifecycle pass deferred");
            report.deferred = Some(error.to_string());
        }
        self.metrics
            .pass_duration
            .observe(started.elapsed().as_secs_f64());
        report
    }

    async fn drive(&self, report: &mut PassReport) -> Result<(), LifecycleError> {
        if let Some(job) = self.find_active_job().await? {
            let outcome = self.advance(&job).await?;
            let in_flight = outcome.still_in_flight();
            report.active = Some(outcome);
            if in_flight {
                return Ok(());
            }
        }

        let candidates = self
            .records
            .fetch_unscored(self.settings.fetch_limit.get())
            .await?;
        report.creation = Some(self.create_job(&candidates).await?);
        Ok(())
    }

    async fn advance(&self, job: &ScoringJob) -> Result<ActiveJobOutcome, LifecycleError> {
        let remote = self.poll_job_status(job).await?;
        info!(
            batch_id = %job.handle,
            remote_status = %remote.raw_status,
            completed = remote.progress.completed,
            total = remote.progress.total,
            "polled scoring batch"
        );

        match remote.status {
            RemoteStatus::Pending => Ok(ActiveJobOutcome::StillRunning {
                handle: job.handle.clone(),
                status: job.status,
                progress: remote.progress,
            }),
            RemoteStatus::Running => {
                let current = if job.status == JobStatus::Pending {
                    self.transition(job, JobStatus::InProgress, None).await?
                } else {
                    job.clone()
                };
                Ok(ActiveJobOutcome::StillRunning {
                    handle: current.handle,
                    status: current.status,
                    progress: remote.progress,
                })
            }
            RemoteStatus::Completed => match self.ingest_completed_job(job).await {
                Ok(outcome) => Ok(ActiveJobOutcome::Ingested(outcome)),
                Err(error) => Ok(ActiveJobOutcome::IngestFailed {
                    handle: job.handle.clone(),
                    error: error.to_string(),
                }),
            },
            RemoteStatus::Failed => {
                let message = remote
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("batch {}", remote.raw_status));
                let message = truncate_error_message(&message);
                self.transition(job, JobStatus::Failed, Some(&message)).await?;
                self.metrics.jobs_failed.inc();
                warn!(batch_id = %job.handle, error = %message, "scoring batch failed remotely");
                Ok(ActiveJobOutcome::RemoteFailed {
                    handle: job.handle.clone(),
                    error: remote.error,
                })
            }
            RemoteStatus::Cancelled => {
                self.transition(job, JobStatus::Cancelled, None).await?;
                self.metrics.jobs_cancelled.inc();
                info!(batch_id = %job.handle, "scoring batch was cancelled");
                Ok(ActiveJobOutcome::RemoteCancelled {
                    handle: job.handle.clone(),
                })
            }
        }
    }

    /// Move a `Failed` job back to `Pending` so the next pass polls and
    /// ingests it again.
    ///
    /// # Errors
    /// - [`LifecycleError::JobInFlight`] when another job is in flight.
    /// - [`LifecycleError::Transition`] when the job is not `Failed`.
    pub async fn retry_failed_job(&self, handle: &str) -> Result<ScoringJob, LifecycleError> {
        let job = self
            .jobs
            .find_by_handle(handle)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(handle.to_string()))?;
        if let Some(active) = self
            .find_active_job()
            .await?
            .filter(|active| active.handle != job.handle)
        {
            return Err(LifecycleError::JobInFlight {
                handle: active.handle,
            });
        }
        let retried = self.transition(&job, JobStatus::Pending, None).await?;
        info!(batch_id = %handle, "scoring batch queued for retry");
        Ok(retried)
    }

    /// Ask the scoring service to cancel `handle`; the stored status follows
    /// on the next poll.
    ///
    /// # Errors
    /// Propagates scoring service failures.
    pub async fn cancel_job(&self, handle: &str) -> Result<(), LifecycleError> {
        self.scoring.cancel(handle).await?;
        info!(batch_id = %handle, "cancellation requested");
        Ok(())
    }

    /// Snapshot for operators. Remote lookups and the record count are best
    /// effort.
    ///
    /// # Errors
    /// Propagates job store failures.
    pub async fn status_report(&self, recent: usize) -> Result<StatusReport, LifecycleError> {
        let active = self.find_active_job().await?;
        let remote = match &active {
            Some(job) => self.poll_job_status(job).await.ok(),
            None => None,
        };
        let unscored = match self.records.count_unscored().await {
            Ok(count) => Some(count),
            Err(error) => {
                warn!(error = %error, "failed to count unscored records");
                None
            }
        };
        let remote_recent = self.scoring.list(recent).await.unwrap_or_else(|error| {
            warn!(error = %error, "failed to list scoring batches");
            Vec::new()
        });
        Ok(StatusReport {
            state: LifecycleState::of(active.as_ref()),
            recent: self.jobs.list_recent(recent).await?,
            active,
            remote,
            unscored,
            remote_recent,
        })
    }

    /// Check the transition table, then compare-and-set the stored status.
    async fn transition(
        &self,
        job: &ScoringJob,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<ScoringJob, LifecycleError> {
        if let Err(invalid) = job.status.check_transition(to) {
            warn!(batch_id = %job.handle, from = %invalid.from, to = %invalid.to, "rejected status transition");
            return Err(invalid.into());
        }
        if job.status.is_noop_transition(to) {
            return Ok(job.clone());
        }
        let updated = self
            .jobs
            .update_status(&job.handle, job.status, to, error)
            .await?;
        info!(batch_id = %job.handle, from = %job.status, to = %to, "scoring batch status changed");
        Ok(updated)
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_metric(count: usize) -> f64 {
    count as f64
}

/// Prometheus metrics for the scoring lifecycle.
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    // Jobs
    pub jobs_created: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_cancelled: Counter,
    pub duplicate_job_races: Counter,
    pub poll_errors: Counter,

    // Results
    pub parse_failures: Counter,
    pub scores_applied: Counter,
    pub scores_skipped: Counter,
    pub scores_failed: Counter,

    pub ingest_duration: Histogram,
    pub pass_duration: Histogram,

    pub jobs_in_flight: Gauge,
}

impl Metrics {
    /// Register every metric on `registry`.
    ///
    /// # Errors
    /// Fails when a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            jobs_created: register_counter_with_registry!(
                "clickscore_jobs_created_total",
                "Total number of scoring batches submitted and recorded",
                registry
            )?,
            jobs_completed: register_counter_with_registry!(
                "clickscore_jobs_completed_total",
                "Total number of scoring batches ingested",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "clickscore_jobs_failed_total",
                "Total number of scoring batches marked failed",
                registry
            )?,
            jobs_cancelled: register_counter_with_registry!(
                "clickscore_jobs_cancelled_total",
                "Total number of scoring batches recorded as cancelled",
                registry
            )?,
            duplicate_job_races: register_counter_with_registry!(
                "clickscore_duplicate_job_races_total",
                "Total number of job inserts that lost the single in-flight race",
                registry
            )?,
            poll_errors: register_counter_with_registry!(
                "clickscore_poll_errors_total",
                "Total number of failed remote status polls",
                registry
            )?,
            parse_failures: register_counter_with_registry!(
                "clickscore_parse_failures_total",
                "Total number of result items rejected by validation",
                registry
            )?,
            scores_applied: register_counter_with_registry!(
                "clickscore_scores_applied_total",
                "Total number of scores written to records",
                registry
            )?,
            scores_skipped: register_counter_with_registry!(
                "clickscore_scores_skipped_total",
                "Total number of score updates skipped because the record was already scored",
                registry
            )?,
            scores_failed: register_counter_with_registry!(
                "clickscore_scores_failed_total",
                "Total number of score writes that failed",
                registry
            )?,
            ingest_duration: register_histogram_with_registry!(
                "clickscore_ingest_duration_seconds",
                "Time spent downloading, parsing and applying batch results",
                vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0],
                registry
            )?,
            pass_duration: register_histogram_with_registry!(
                "clickscore_pass_duration_seconds",
                "Duration of one lifecycle pass",
                vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0],
                registry
            )?,
            jobs_in_flight: register_gauge_with_registry!(
                "clickscore_jobs_in_flight",
                "Number of scoring batches in a non-terminal status seen by the last pass",
                registry
            )?,
        })
    }
}

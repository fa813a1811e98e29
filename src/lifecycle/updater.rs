use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::observability::Metrics;
use crate::scoring::{RecordId, ScoreUpdate};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to query which records are already scored: {0}")]
    PreFilter(#[source] StoreError),
    #[error("none of {attempted} score updates could be written (first error: {first_error})")]
    NothingApplied {
        attempted: usize,
        first_error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpdate {
    pub record_id: RecordId,
    pub error: String,
}

/// Outcome of one [`IdempotentBulkUpdater::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub requested: usize,
    /// Already scored before or during the call, or unknown to the store.
    pub skipped: usize,
    pub applied: usize,
    pub failed: Vec<FailedUpdate>,
}

/// Writes score updates without touching records that already carry a score.
#[derive(Clone)]
pub struct IdempotentBulkUpdater {
    records: Arc<dyn RecordStore>,
    metrics: Arc<Metrics>,
}

impl IdempotentBulkUpdater {
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, metrics: Arc<Metrics>) -> Self {
        Self { records, metrics }
    }

    /// Apply `updates`, skipping records that are already scored.
    ///
    /// Individual write failures are logged and reported in
    /// [`ApplyReport::failed`]; applying the same updates twice writes
    /// nothing the second time.
    ///
    /// # Errors
    /// - [`UpdateError::PreFilter`] when the scored-status query fails.
    /// - [`UpdateError::NothingApplied`] when every attempted write failed.
    pub async fn apply(&self, updates: &[ScoreUpdate]) -> Result<ApplyReport, UpdateError> {
        let mut report = ApplyReport {
            requested: updates.len(),
            ..ApplyReport::default()
        };
        if updates.is_empty() {
            return Ok(report);
        }

        let ids: Vec<RecordId> = updates.iter().map(|u| u.record_id).collect();
        let already_scored = self
            .records
            .query_scored_status(&ids)
            .await
            .map_err(UpdateError::PreFilter)?;

        let mut seen = HashSet::with_capacity(updates.len());
        let pending: Vec<&ScoreUpdate> = updates
            .iter()
            .filter(|u| !already_scored.contains(&u.record_id) && seen.insert(u.record_id))
            .collect();
        report.skipped = updates.len() - pending.len();
        debug!(
            requested = report.requested,
            pending = pending.len(),
            "pre-filtered score updates"
        );

        for update in &pending {
            match self.records.apply_score(update).await {
                Ok(true) => report.applied += 1,
                Ok(false) => report.skipped += 1,
                Err(error) => {
                    warn!(
                        record_id = update.record_id,
                        error = %error,
                        "failed to write score"
                    );
                    report.failed.push(FailedUpdate {
                        record_id: update.record_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        self.record_metrics(&report);

        if !pending.is_empty() && report.failed.len() == pending.len() {
            return Err(UpdateError::NothingApplied {
                attempted: pending.len(),
                first_error: report.failed[0].error.clone(),
            });
        }

        info!(
            requested = report.requested,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed.len(),
            "applied score updates"
        );
        Ok(report)
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_metrics(&self, report: &ApplyReport) {
        self.metrics.scores_applied.inc_by(report.applied as f64);
        self.metrics.scores_skipped.inc_by(report.skipped as f64);
        self.metrics.scores_failed.inc_by(report.failed.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;
    use crate::store::memory::MemoryRecordStore;
    use prometheus::Registry;

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new(&Registry::new()).expect("metrics"))
    }

    fn update(id: RecordId, score: i32) -> ScoreUpdate {
        ScoreUpdate {
            record_id: id,
            score,
            explanation: format!("why {id}"),
        }
    }

    fn store_with(ids: &[RecordId]) -> Arc<MemoryRecordStore> {
        Arc::new(MemoryRecordStore::new(
            ids.iter().map(|&id| Record::new(id, "title", "body")),
        ))
    }

    #[tokio::test]
    async fn applying_twice_writes_once() {
        let store = store_with(&[1, 2]);
        let updater = IdempotentBulkUpdater::new(store.clone(), metrics());
        let updates = vec![update(1, 10), update(2, 20)];

        let first = updater.apply(&updates).await.expect("first apply");
        let second = updater.apply(&updates).await.expect("second apply");

        assert_eq!(first.applied, 2);
        assert_eq!(second.applied, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.apply_calls().await, 2);
        assert_eq!(store.get(2).await.and_then(|r| r.score), Some(20));
    }

    #[tokio::test]
    async fn single_write_failure_is_logged_and_skipped() {
        let store = store_with(&[1, 2, 3]);
        store.fail_writes_for(2).await;
        let updater = IdempotentBulkUpdater::new(store.clone(), metrics());

        let report = updater
            .apply(&[update(1, 10), update(2, 20), update(3, 30)])
            .await
            .expect("partial success");

        assert_eq!(report.applied, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].record_id, 2);
        assert_eq!(store.get(1).await.and_then(|r| r.score), Some(10));
        assert_eq!(store.get(2).await.and_then(|r| r.score), None);
        assert_eq!(store.get(3).await.and_then(|r| r.score), Some(30));
    }

    #[tokio::test]
    async fn all_writes_failing_is_an_error() {
        let store = store_with(&[1]);
        store.fail_writes_for(1).await;
        let updater = IdempotentBulkUpdater::new(store, metrics());

        let error = updater.apply(&[update(1, 10)]).await.expect_err("nothing applied");
        assert!(matches!(error, UpdateError::NothingApplied { attempted: 1, .. }));
    }

    #[tokio::test]
    async fn pre_filter_failure_is_systemic() {
        let store = store_with(&[1]);
        store.set_unavailable(true).await;
        let updater = IdempotentBulkUpdater::new(store, metrics());

        let error = updater.apply(&[update(1, 10)]).await.expect_err("pre-filter");
        assert!(matches!(error, UpdateError::PreFilter(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn empty_or_fully_scored_input_succeeds() {
        let store = store_with(&[1]);
        let updater = IdempotentBulkUpdater::new(store.clone(), metrics());
        assert_eq!(updater.apply(&[]).await.expect("empty"), ApplyReport::default());

        updater.apply(&[update(1, 10)]).await.expect("first");
        let report = updater.apply(&[update(1, 99)]).await.expect("already scored");
        assert_eq!(report.skipped, 1);
        assert_eq!(store.get(1).await.and_then(|r| r.score), Some(10));
    }

    #[tokio::test]
    async fn duplicate_ids_in_one_call_are_written_once() {
        let store = store_with(&[1]);
        let updater = IdempotentBulkUpdater::new(store.clone(), metrics());

        let report = updater
            .apply(&[update(1, 10), update(1, 90)])
            .await
            .expect("apply");

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.apply_calls().await, 1);
    }
}

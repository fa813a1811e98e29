use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::scoring::{RawResult, ScoreRequest};

/// Opaque batch identifier issued by the scoring service.
pub type JobHandle = String;

#[derive(Debug, Error)]
pub enum ScoringServiceError {
    #[error("scoring service transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scoring service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("results for batch {handle} are unavailable (status {status})")]
    ResultsUnavailable { handle: String, status: String },
    #[error("unexpected scoring service response: {0}")]
    UnexpectedResponse(String),
    #[error("invalid scoring request: {0}")]
    InvalidRequest(String),
}

/// Remote batch status reduced to what the lifecycle cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-request counters reported by the scoring service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

impl BatchProgress {
    /// Completed requests as a percentage of the total.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

/// A batch as last seen at the scoring service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteBatch {
    pub handle: JobHandle,
    pub status: RemoteStatus,
    /// Status string exactly as the service reported it.
    pub raw_status: String,
    pub progress: BatchProgress,
    pub created_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Asynchronous batch scoring backend.
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Submit one batch; returns its handle.
    async fn submit(&self, requests: &[ScoreRequest]) -> Result<JobHandle, ScoringServiceError>;

    /// Transport failures mean "unknown", never "failed".
    async fn get_status(&self, handle: &str) -> Result<RemoteBatch, ScoringServiceError>;

    /// Fails with [`ScoringServiceError::ResultsUnavailable`] unless the batch
    /// completed.
    async fn fetch_results(&self, handle: &str) -> Result<Vec<RawResult>, ScoringServiceError>;

    async fn cancel(&self, handle: &str) -> Result<(), ScoringServiceError>;

    /// Most recent batches first.
    async fn list(&self, limit: usize) -> Result<Vec<RemoteBatch>, ScoringServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_rate_handles_empty_batches() {
        assert!(BatchProgress::default().completion_rate().abs() < f64::EPSILON);
        let progress = BatchProgress {
            total: 8,
            completed: 2,
            failed: 1,
        };
        assert!((progress.completion_rate() - 25.0).abs() < f64::EPSILON);
    }
}

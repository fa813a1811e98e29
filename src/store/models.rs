use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::JobStatus;
use crate::scoring::RecordId;

/// A scraped article, scored or awaiting a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub title: String,
    pub body: String,
    pub score: Option<i32>,
    pub explanation: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// An unscored record.
    #[must_use]
    pub fn new(id: RecordId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            score: None,
            explanation: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

/// One asynchronous submission tracked by its external batch handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringJob {
    pub handle: String,
    pub status: JobStatus,
    pub input_count: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ScoringJob {
    /// A freshly submitted job in [`JobStatus::Pending`].
    #[must_use]
    pub fn new(handle: impl Into<String>, input_count: i32) -> Self {
        Self {
            handle: handle.into(),
            status: JobStatus::Pending,
            input_count,
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        !self.status.is_terminal()
    }
}

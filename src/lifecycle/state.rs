use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::models::ScoringJob;

/// Stored status of a scoring job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted; the scoring service has not started it yet.
    Pending,
    /// The scoring service reported the batch as running.
    InProgress,
    /// Results were ingested.
    Completed,
    /// Remote failure, expiry, or an ingestion error.
    Failed,
    /// Cancelled at the scoring service.
    Cancelled,
}

impl JobStatus {
    pub const IN_FLIGHT: [Self; 2] = [Self::Pending, Self::InProgress];

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the transition table admits `self -> to`.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        use JobStatus::{Cancelled, Completed, Failed, InProgress, Pending};

        matches!(
            (self, to),
            (Pending, InProgress | Failed | Cancelled)
                | (InProgress, Completed | Failed | Cancelled)
                | (Completed, Completed)
                | (Failed, Failed | Pending)
                | (Cancelled, Cancelled)
        )
    }

    /// # Errors
    /// Returns [`InvalidTransition`] when the table has no `self -> to` edge.
    pub fn check_transition(self, to: Self) -> Result<(), InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Terminal self-transitions are accepted but leave the store untouched.
    #[must_use]
    pub fn is_noop_transition(self, to: Self) -> bool {
        self == to && self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid scoring job status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid scoring job transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Lifecycle state as seen by one invocation, including the derived
/// "nothing in flight" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NoActiveJob,
    Pending,
    InProgress,
}

impl LifecycleState {
    #[must_use]
    pub fn of(active: Option<&ScoringJob>) -> Self {
        match active.map(|job| job.status) {
            Some(JobStatus::Pending) => Self::Pending,
            Some(JobStatus::InProgress) => Self::InProgress,
            _ => Self::NoActiveJob,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveJob => write!(f, "no_active_job"),
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
        }
    }
}

//! Turning records into scoring requests and raw scoring output back into
//! validated score updates.

pub mod parser;
pub mod prompt;
pub mod types;
pub mod validator;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub use parser::{BatchParseFailure, ItemError, ResultParser};
pub use prompt::PromptBuilder;
pub use types::{
    RawResult, RecordId, ResultEnvelope, ScoreRequest, ScoreUpdate, identifier_tag,
    parse_identifier_tag,
};
pub use validator::{ScoreValidator, ValidatedScore, ValidationError};

/// How [`ResultParser`] treats a result set that contains invalid items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsePolicy {
    /// Any invalid item rejects the whole result set.
    #[default]
    Strict,
    /// Invalid items are logged and dropped; valid ones are kept.
    BestEffort,
}

impl ParsePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::BestEffort => "best_effort",
        }
    }
}

impl fmt::Display for ParsePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParsePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            other => Err(format!(
                "unknown parse policy `{other}` (expected `strict` or `best_effort`)"
            )),
        }
    }
}

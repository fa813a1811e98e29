use thiserror::Error;
use tracing::{error, warn};

use super::{
    ParsePolicy,
    types::{RawResult, ScoreUpdate, parse_identifier_tag},
    validator::{ScoreValidator, ValidationError},
};

/// One rejected result line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("item {index} ({}): {source}", .custom_id.as_deref().unwrap_or("<no custom_id>"))]
pub struct ItemError {
    /// Position of the line in the result set.
    pub index: usize,
    pub custom_id: Option<String>,
    #[source]
    pub source: ValidationError,
}

/// Every item error of a rejected result set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} of {total} batch results failed validation", .errors.len())]
pub struct BatchParseFailure {
    pub errors: Vec<ItemError>,
    pub total: usize,
}

/// Validates a whole result set against a [`ParsePolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultParser {
    validator: ScoreValidator,
    policy: ParsePolicy,
}

impl ResultParser {
    #[must_use]
    pub fn new(validator: ScoreValidator, policy: ParsePolicy) -> Self {
        Self { validator, policy }
    }

    /// Convert raw result lines into score updates, keeping input order.
    ///
    /// Under [`ParsePolicy::Strict`] any invalid line yields
    /// [`BatchParseFailure`] and no updates. Under
    /// [`ParsePolicy::BestEffort`] invalid lines are logged and dropped, and
    /// the call only fails when not a single line was valid.
    ///
    /// # Errors
    /// Returns [`BatchParseFailure`] carrying every item error.
    pub fn parse(&self, raw_results: &[RawResult]) -> Result<Vec<ScoreUpdate>, BatchParseFailure> {
        let mut updates = Vec::with_capacity(raw_results.len());
        let mut errors = Vec::new();

        for (index, raw) in raw_results.iter().enumerate() {
            match self.parse_item(raw) {
                Ok(update) => updates.push(update),
                Err(source) => {
                    let item = ItemError {
                        index,
                        custom_id: raw.custom_id.clone(),
                        source,
                    };
                    warn!(
                        index = item.index,
                        custom_id = item.custom_id.as_deref().unwrap_or(""),
                        error = %item.source,
                        "rejected scoring result"
                    );
                    errors.push(item);
                }
            }
        }

        if errors.is_empty() {
            return Ok(updates);
        }

        let total = raw_results.len();
        let keep_partial = self.policy == ParsePolicy::BestEffort && !updates.is_empty();
        if keep_partial {
            warn!(
                valid = updates.len(),
                invalid = errors.len(),
                total,
                "dropping invalid scoring results"
            );
            return Ok(updates);
        }

        let failure = BatchParseFailure { errors, total };
        error!(
            invalid = failure.errors.len(),
            total,
            policy = %self.policy,
            "batch result set rejected"
        );
        Err(failure)
    }

    fn parse_item(&self, raw: &RawResult) -> Result<ScoreUpdate, ValidationError> {
        let record_id = raw
            .custom_id
            .as_deref()
            .and_then(parse_identifier_tag)
            .ok_or_else(|| ValidationError::InvalidIdentifier(raw.custom_id.clone()))?;

        let status_code = raw.status_code();
        let failed_status = status_code.is_some_and(|code| code != 200);
        let failed_without_response = raw.response.is_none() && raw.error_message().is_some();
        if failed_status || failed_without_response {
            return Err(ValidationError::RequestFailed {
                status_code,
                message: raw
                    .error_message()
                    .unwrap_or_else(|| "no error detail".to_string()),
            });
        }

        let content = raw
            .message_content()
            .filter(|content| !content.trim().is_empty())
            .ok_or(ValidationError::EmptyResponse)?;

        self.validator
            .validate(content)
            .map(|validated| validated.into_update(record_id))
    }
}

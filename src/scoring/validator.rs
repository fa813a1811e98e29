use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{RecordId, ScoreUpdate};
use crate::util::text::truncate_chars;

pub const SCORE_FIELD: &str = "clickbait_score";
pub const EXPLANATION_FIELD: &str = "clickbait_explanation";
/// Older prompt revisions answered with `reasoning` instead.
const LEGACY_EXPLANATION_FIELD: &str = "reasoning";

/// Why a single scoring response was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("score {value} is not an integer within 0..={max}")]
    ScoreOutOfRange { value: String, max: i32 },
    #[error("explanation is empty")]
    EmptyExplanation,
    #[error("invalid identifier tag: {0:?}")]
    InvalidIdentifier(Option<String>),
    #[error("response carries no message content")]
    EmptyResponse,
    #[error("scoring request failed (status {status_code:?}): {message}")]
    RequestFailed {
        status_code: Option<u16>,
        message: String,
    },
}

/// Score and explanation that passed validation, not yet tied to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedScore {
    pub score: i32,
    pub explanation: String,
}

impl ValidatedScore {
    #[must_use]
    pub fn into_update(self, record_id: RecordId) -> ScoreUpdate {
        ScoreUpdate {
            record_id,
            score: self.score,
            explanation: self.explanation,
        }
    }
}

/// Checks one structured scoring response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreValidator {
    max_score: i32,
    max_explanation_chars: usize,
}

impl Default for ScoreValidator {
    fn default() -> Self {
        Self::new(100, 500)
    }
}

impl ScoreValidator {
    #[must_use]
    pub fn new(max_score: i32, max_explanation_chars: usize) -> Self {
        Self {
            max_score,
            max_explanation_chars,
        }
    }

    /// Validate the JSON text the scoring model returned.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found; fields are checked in the
    /// order payload shape, score, explanation.
    pub fn validate(&self, raw_content: &str) -> Result<ValidatedScore, ValidationError> {
        let value: Value = serde_json::from_str(raw_content.trim())
            .map_err(|error| ValidationError::MalformedPayload(error.to_string()))?;
        let Value::Object(payload) = value else {
            return Err(ValidationError::MalformedPayload(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        };

        let score = self.check_score(&payload)?;
        let explanation = self.check_explanation(&payload)?;
        Ok(ValidatedScore { score, explanation })
    }

    fn check_score(&self, payload: &Map<String, Value>) -> Result<i32, ValidationError> {
        let raw = present(payload, SCORE_FIELD).ok_or(ValidationError::MissingField(SCORE_FIELD))?;
        let out_of_range = || ValidationError::ScoreOutOfRange {
            value: raw.to_string(),
            max: self.max_score,
        };
        // 72.0 and "72" are rejected along with out-of-range integers.
        let score = raw.as_i64().ok_or_else(out_of_range)?;
        if !(0..=i64::from(self.max_score)).contains(&score) {
            return Err(out_of_range());
        }
        i32::try_from(score).map_err(|_| out_of_range())
    }

    fn check_explanation(&self, payload: &Map<String, Value>) -> Result<String, ValidationError> {
        let raw = present(payload, EXPLANATION_FIELD)
            .or_else(|| present(payload, LEGACY_EXPLANATION_FIELD))
            .ok_or(ValidationError::MissingField(EXPLANATION_FIELD))?;
        let text = raw.as_str().ok_or_else(|| {
            ValidationError::MalformedPayload(format!(
                "`{EXPLANATION_FIELD}` must be a string, got {}",
                json_kind(raw)
            ))
        })?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyExplanation);
        }
        Ok(truncate_chars(trimmed, self.max_explanation_chars))
    }
}

fn present<'a>(payload: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    payload.get(field).filter(|value| !value.is_null())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ScoreValidator {
        ScoreValidator::new(100, 500)
    }

    #[test]
    fn accepts_well_formed_payload() {
        let validated = validator()
            .validate(r#"{"clickbait_score": 72, "clickbait_explanation": "  제목이 과장됨  "}"#)
            .expect("valid payload");

        assert_eq!(validated.score, 72);
        assert_eq!(validated.explanation, "제목이 과장됨");
    }

    #[test]
    fn score_bounds_are_inclusive() {
        let v = validator();
        assert!(v.validate(r#"{"clickbait_score": 0, "clickbait_explanation": "ok"}"#).is_ok());
        assert!(v.validate(r#"{"clickbait_score": 100, "clickbait_explanation": "ok"}"#).is_ok());
        assert_eq!(
            v.validate(r#"{"clickbait_score": 101, "clickbait_explanation": "ok"}"#),
            Err(ValidationError::ScoreOutOfRange {
                value: "101".to_string(),
                max: 100
            })
        );
        assert!(matches!(
            v.validate(r#"{"clickbait_score": -1, "clickbait_explanation": "ok"}"#),
            Err(ValidationError::ScoreOutOfRange { .. })
        ));
    }

    #[test]
    fn non_integer_scores_are_out_of_range() {
        let v = validator();
        for payload in [
            r#"{"clickbait_score": 72.5, "clickbait_explanation": "ok"}"#,
            r#"{"clickbait_score": "72", "clickbait_explanation": "ok"}"#,
            r#"{"clickbait_score": true, "clickbait_explanation": "ok"}"#,
        ] {
            assert!(
                matches!(v.validate(payload), Err(ValidationError::ScoreOutOfRange { .. })),
                "{payload}"
            );
        }
    }

    #[test]
    fn configured_bound_is_respected() {
        let v = ScoreValidator::new(10, 500);
        assert!(v.validate(r#"{"clickbait_score": 10, "clickbait_explanation": "ok"}"#).is_ok());
        assert!(v.validate(r#"{"clickbait_score": 11, "clickbait_explanation": "ok"}"#).is_err());
    }

    #[test]
    fn missing_fields_are_reported() {
        let v = validator();
        assert_eq!(
            v.validate(r#"{"clickbait_explanation": "ok"}"#),
            Err(ValidationError::MissingField(SCORE_FIELD))
        );
        assert_eq!(
            v.validate(r#"{"clickbait_score": 5}"#),
            Err(ValidationError::MissingField(EXPLANATION_FIELD))
        );
        assert_eq!(
            v.validate(r#"{"clickbait_score": null, "clickbait_explanation": "ok"}"#),
            Err(ValidationError::MissingField(SCORE_FIELD))
        );
    }

    #[test]
    fn legacy_reasoning_field_is_accepted() {
        let validated = validator()
            .validate(r#"{"clickbait_score": 5, "reasoning": "plain headline"}"#)
            .expect("legacy payload");
        assert_eq!(validated.explanation, "plain headline");
    }

    #[test]
    fn blank_explanation_is_rejected() {
        assert_eq!(
            validator().validate(r#"{"clickbait_score": 5, "clickbait_explanation": " \n\t "}"#),
            Err(ValidationError::EmptyExplanation)
        );
    }

    #[test]
    fn non_object_payloads_are_malformed() {
        let v = validator();
        for payload in ["not json", "[1, 2]", "42", "\"text\""] {
            assert!(
                matches!(v.validate(payload), Err(ValidationError::MalformedPayload(_))),
                "{payload}"
            );
        }
        assert!(matches!(
            v.validate(r#"{"clickbait_score": 5, "clickbait_explanation": 12}"#),
            Err(ValidationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn explanation_is_truncated_by_characters() {
        let v = ScoreValidator::new(100, 4);
        let validated = v
            .validate(r#"{"clickbait_score": 5, "clickbait_explanation": "가나다라마바"}"#)
            .expect("valid payload");
        assert_eq!(validated.explanation, "가나다라");
    }
}

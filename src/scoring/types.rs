use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record identifier assigned by the record store.
pub type RecordId = i64;

const IDENTIFIER_PREFIX: &str = "article_";

/// Correlation tag attached to each request so results can be matched back to
/// their record.
#[must_use]
pub fn identifier_tag(record_id: RecordId) -> String {
    format!("{IDENTIFIER_PREFIX}{record_id}")
}

/// Extract the record id from an `article_<id>` tag.
///
/// Only plain decimal ids are accepted; signs, whitespace and empty ids are
/// rejected.
#[must_use]
pub fn parse_identifier_tag(tag: &str) -> Option<RecordId> {
    let digits = tag.strip_prefix(IDENTIFIER_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// One record to be scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreRequest {
    pub record_id: RecordId,
    /// User prompt; the system instructions are attached by the scoring client.
    pub prompt: String,
}

impl ScoreRequest {
    #[must_use]
    pub fn custom_id(&self) -> String {
        identifier_tag(self.record_id)
    }
}

/// Validated score ready to be written to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub record_id: RecordId,
    pub score: i32,
    pub explanation: String,
}

/// One line of scoring-service output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub response: Option<ResultEnvelope>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Per-request response wrapper inside a result line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub body: Value,
}

impl RawResult {
    /// Build a result line whose message content is `content`.
    #[must_use]
    pub fn with_content(custom_id: impl Into<String>, content: &str) -> Self {
        Self {
            custom_id: Some(custom_id.into()),
            response: Some(ResultEnvelope {
                status_code: Some(200),
                body: serde_json::json!({
                    "choices": [{ "message": { "role": "assistant", "content": content } }]
                }),
            }),
            error: None,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().and_then(|r| r.status_code)
    }

    /// `body.choices[0].message.content`, when present and a string.
    #[must_use]
    pub fn message_content(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .body
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
    }

    /// Best description of a per-request failure carried by the line.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let from_error = self.error.as_ref().filter(|e| !e.is_null()).map(|e| {
            e.get("message")
                .and_then(Value::as_str)
                .map_or_else(|| e.to_string(), str::to_string)
        });
        from_error.or_else(|| {
            self.response
                .as_ref()?
                .body
                .get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
    }
}

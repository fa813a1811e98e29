/// Structured-output schema for one clickbait evaluation.
use serde_json::{Value, json};

use crate::scoring::validator::{EXPLANATION_FIELD, SCORE_FIELD};

pub const SCHEMA_NAME: &str = "clickbait_evaluation";

/// Evaluation schema with the score bounded to `0..=max_score`.
#[must_use]
pub fn evaluation_schema(max_score: i32) -> Value {
    json!({
        "type": "object",
        "properties": {
            SCORE_FIELD: {
                "type": "integer",
                "minimum": 0,
                "maximum": max_score,
                "description": format!("클릭베이트 점수 (0-{max_score})")
            },
            EXPLANATION_FIELD: {
                "type": "string",
                "description": "클릭베이트 점수 판단 근거"
            }
        },
        "required": [SCORE_FIELD, EXPLANATION_FIELD],
        "additionalProperties": false
    })
}

/// `response_format` object for a chat completion request.
#[must_use]
pub fn response_format(max_score: i32) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "strict": true,
            "schema": evaluation_schema(max_score)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_valid(schema: &Value, instance: &Value) -> bool {
        jsonschema::validator_for(schema)
            .expect("schema compiles")
            .is_valid(instance)
    }

    #[test]
    fn schema_accepts_a_valid_evaluation() {
        let schema = evaluation_schema(100);
        assert!(is_valid(
            &schema,
            &json!({ "clickbait_score": 100, "clickbait_explanation": "과장된 제목" })
        ));
    }

    #[test]
    fn schema_rejects_out_of_range_and_extra_fields() {
        let schema = evaluation_schema(100);
        assert!(!is_valid(
            &schema,
            &json!({ "clickbait_score": 101, "clickbait_explanation": "x" })
        ));
        assert!(!is_valid(
            &schema,
            &json!({ "clickbait_score": 10, "clickbait_explanation": "x", "extra": 1 })
        ));
        assert!(!is_valid(&schema, &json!({ "clickbait_score": 10 })));
    }

    #[test]
    fn response_format_is_strict_json_schema() {
        let format = response_format(10);
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], SCHEMA_NAME);
        assert_eq!(format["json_schema"]["strict"], true);
        assert_eq!(
            format["json_schema"]["schema"]["properties"]["clickbait_score"]["maximum"],
            10
        );
    }
}

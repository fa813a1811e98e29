// Result files in the shape the batch API returns them.
use std::{fs, path::PathBuf};

use clickscore_worker::scoring::{
    ParsePolicy, RawResult, ResultParser, ScoreValidator, ValidationError,
};

fn load_results() -> Vec<RawResult> {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data/batch_output.jsonl");
    let raw = fs::read_to_string(path).expect("failed to read batch output fixture");
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("fixture line should parse"))
        .collect()
}

#[test]
fn batch_output_file_parses_into_updates() {
    let results = load_results();
    let parser = ResultParser::new(ScoreValidator::default(), ParsePolicy::Strict);

    let updates = parser.parse(&results).expect("fixture is valid");

    let scores: Vec<_> = updates.iter().map(|u| (u.record_id, u.score)).collect();
    assert_eq!(scores, vec![(101, 85), (102, 5), (103, 40)]);
    assert!(updates[0].explanation.contains("충격"));
}

#[test]
fn lowered_score_bound_rejects_the_whole_file() {
    let results = load_results();
    let parser = ResultParser::new(ScoreValidator::new(50, 500), ParsePolicy::Strict);

    let failure = parser.parse(&results).expect_err("85 exceeds 50");

    assert_eq!(failure.total, 3);
    assert_eq!(failure.errors.len(), 1);
    assert_eq!(failure.errors[0].custom_id.as_deref(), Some("article_101"));
    assert_eq!(
        failure.errors[0].source,
        ValidationError::ScoreOutOfRange {
            value: "85".to_string(),
            max: 50
        }
    );
}

#[test]
fn best_effort_drops_only_the_offending_line() {
    let results = load_results();
    let parser = ResultParser::new(ScoreValidator::new(50, 500), ParsePolicy::BestEffort);

    let updates = parser.parse(&results).expect("two lines remain valid");

    let ids: Vec<_> = updates.iter().map(|u| u.record_id).collect();
    assert_eq!(ids, vec![102, 103]);
}

#[test]
fn explanations_are_truncated_to_the_configured_length() {
    let results = load_results();
    let parser = ResultParser::new(ScoreValidator::new(100, 5), ParsePolicy::Strict);

    let updates = parser.parse(&results).expect("fixture is valid");

    assert!(updates.iter().all(|u| u.explanation.chars().count() <= 5));
}

//! Character-based truncation helpers.
//!
//! Explanations and error messages land in bounded text columns and article
//! text is Korean, so everything here counts `char`s, never bytes.

/// Maximum length of an error message persisted on a failed batch.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Keep at most `max_chars` characters of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Truncate `text` and append `suffix` when something was cut.
#[must_use]
pub fn excerpt(text: &str, max_chars: usize, suffix: &str) -> String {
    let truncated = truncate_chars(text, max_chars);
    if truncated.len() < text.len() {
        format!("{truncated}{suffix}")
    } else {
        truncated
    }
}

/// Summarize an error message for storage.
#[must_use]
pub fn truncate_error_message(msg: &str) -> String {
    let char_count = msg.chars().count();
    if char_count <= MAX_ERROR_MESSAGE_LENGTH {
        return msg.to_string();
    }
    let truncated = truncate_chars(msg, MAX_ERROR_MESSAGE_LENGTH);
    format!("{truncated}... (truncated, {char_count} chars)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        let text = "낚시성 기사 제목";
        assert_eq!(truncate_chars(text, 3), "낚시성");
        assert_eq!(truncate_chars(text, 100), text);
    }

    #[test]
    fn excerpt_only_appends_suffix_when_cut() {
        assert_eq!(excerpt("abcdef", 3, "..."), "abc...");
        assert_eq!(excerpt("abc", 3, "..."), "abc");
    }

    #[test]
    fn truncate_error_message_keeps_short_messages() {
        assert_eq!(truncate_error_message("boom"), "boom");
    }

    #[test]
    fn truncate_error_message_marks_long_messages() {
        let long = "x".repeat(MAX_ERROR_MESSAGE_LENGTH + 20);
        let truncated = truncate_error_message(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_MESSAGE_LENGTH)));
        assert!(truncated.ends_with("(truncated, 520 chars)"));
    }
}

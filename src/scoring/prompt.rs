use tracing::debug;

use super::types::ScoreRequest;
use crate::store::models::Record;
use crate::util::text::excerpt;

/// Builds scoring prompts from records.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_score: i32,
    body_max_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(100, 700)
    }
}

impl PromptBuilder {
    #[must_use]
    pub fn new(max_score: i32, body_max_chars: usize) -> Self {
        Self {
            max_score,
            body_max_chars,
        }
    }

    /// Instructions sent as the system message of every request.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        format!(
            "당신은 뉴스의 제목과 내용을 분석하여 클릭베이트 여부를 판단하는 전문가입니다. \
             주어진 뉴스 제목과 본문 내용을 분석하여 해당 기사의 제목이 클릭베이트인지 여부를 판단하고, \
             그 정도를 0에서 {max} 사이의 정수로 평가해주세요. 객관적이고 일관된 기준으로 평가해주세요.",
            max = self.max_score
        )
    }

    #[must_use]
    pub fn build(&self, record: &Record) -> ScoreRequest {
        ScoreRequest {
            record_id: record.id,
            prompt: self.user_prompt(&record.title, &record.body),
        }
    }

    #[must_use]
    pub fn build_all(&self, records: &[Record]) -> Vec<ScoreRequest> {
        let requests: Vec<_> = records.iter().map(|record| self.build(record)).collect();
        debug!(requests = requests.len(), "built scoring requests");
        requests
    }

    fn user_prompt(&self, title: &str, body: &str) -> String {
        let max = self.max_score;
        let limit = self.body_max_chars;
        let body = excerpt(body, limit, "...");
        format!(
            "다음 단계를 따라 분석을 진행해주세요:

1. 뉴스 제목 분석:
   - 제목에 모호하거나 오해의 소지가 있는 표현이 있는지 살펴보세요.
   - \"충격\", \"경악\", \"발칵\" 등 감정적 반응을 유도하는 과장된 표현이 있는지 확인하세요.
   - \"이것\", \"저것\", \"그것\" 등 모호한 대명사를 사용해 호기심을 유발하는지 확인하세요.

2. 본문 내용 분석:
   - 핵심 정보와 주요 메시지를 파악하세요.
   - 본문 내용은 최대 {limit}자까지만 제공됩니다.

3. 클릭베이트 의도 분석:
   - 제목이 내용을 과장하거나 왜곡하여 독자를 오도하고 있는지 살펴보세요.
   - 기사의 소재 자체가 자극적인 경우에는 제목과 내용의 일치 여부를 주의깊게 확인하세요.

4. 클릭베이트 정도 평가:
   - 기사 제목의 클릭베이트 정도를 0-{max} 사이의 정수로 평가하세요.
   - 0은 제목이 본문 내용을 정확하게 반영함을, {max}은 제목이 본문 내용과 거의 무관하거나 완전히 왜곡함을 뜻합니다.
   - 평가 이유를 구체적으로 설명하세요.

**뉴스 제목:** {title}

**뉴스 내용:** {body}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, title: &str, body: &str) -> Record {
        Record::new(id, title, body)
    }

    #[test]
    fn build_tags_request_with_record_id() {
        let request = PromptBuilder::default().build(&record(12, "충격! 이것의 정체", "본문"));

        assert_eq!(request.record_id, 12);
        assert_eq!(request.custom_id(), "article_12");
        assert!(request.prompt.contains("**뉴스 제목:** 충격! 이것의 정체"));
        assert!(request.prompt.ends_with("**뉴스 내용:** 본문"));
    }

    #[test]
    fn long_bodies_are_cut_with_ellipsis() {
        let body = "가".repeat(30);
        let request = PromptBuilder::new(100, 10).build(&record(1, "제목", &body));

        let expected = format!("**뉴스 내용:** {}...", "가".repeat(10));
        assert!(request.prompt.ends_with(&expected));
    }

    #[test]
    fn prompts_mention_configured_bound() {
        let builder = PromptBuilder::new(10, 700);
        assert!(builder.system_prompt().contains("0에서 10 사이"));
        assert!(builder.build(&record(1, "t", "b")).prompt.contains("0-10 사이"));
    }

    #[test]
    fn build_all_preserves_order() {
        let records = vec![record(3, "a", "x"), record(1, "b", "y")];
        let ids: Vec<_> = PromptBuilder::default()
            .build_all(&records)
            .iter()
            .map(|r| r.record_id)
            .collect();
        assert_eq!(ids, vec![3, 1]);
    }
}

//! OpenAI Batch API adapter.
//!
//! A submission is a JSONL file of chat-completion requests uploaded with
//! purpose `batch`, followed by a batch creation call. Results come back as
//! JSONL output (and error) files once the batch completes.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{
    Client, Response, Url,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::scoring_service::{
    BatchProgress, JobHandle, RemoteBatch, RemoteStatus, ScoringService, ScoringServiceError,
};
use crate::config::Config;
use crate::schema::clickbait;
use crate::scoring::{PromptBuilder, RawResult, ScoreRequest};
use crate::util::text::truncate_error_message;

const CHAT_COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";
const BATCH_FILE_NAME: &str = "clickbait_batch.jsonl";

/// Everything the adapter needs besides the HTTP client.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub completion_window: String,
    pub timeout: Duration,
    pub max_score: i32,
    pub system_prompt: String,
}

impl OpenAiSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let prompts = PromptBuilder::new(config.score_max(), config.prompt_body_max_chars());
        Self {
            base_url: config.openai_base_url().to_string(),
            api_key: config.openai_api_key().to_string(),
            model: config.scoring_model().to_string(),
            completion_window: config.completion_window().to_string(),
            timeout: config.http_timeout(),
            max_score: config.score_max(),
            system_prompt: prompts.system_prompt(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiBatchClient {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
    completion_window: String,
    system_prompt: String,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
    #[serde(default)]
    error_file_id: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    request_counts: Option<RequestCounts>,
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Default, Deserialize)]
struct RequestCounts {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    completed: u64,
    #[serde(default)]
    failed: u64,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    data: Vec<BatchErrorItem>,
}

#[derive(Debug, Deserialize)]
struct BatchErrorItem {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    line: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BatchList {
    #[serde(default)]
    data: Vec<BatchObject>,
}

fn map_remote_status(raw: &str) -> Option<RemoteStatus> {
    match raw {
        "validating" => Some(RemoteStatus::Pending),
        "in_progress" | "finalizing" | "cancelling" => Some(RemoteStatus::Running),
        "completed" => Some(RemoteStatus::Completed),
        "failed" | "expired" => Some(RemoteStatus::Failed),
        "cancelled" => Some(RemoteStatus::Cancelled),
        _ => None,
    }
}

impl BatchObject {
    fn error_summary(&self) -> Option<String> {
        let details: Vec<String> = self
            .errors
            .as_ref()
            .map(|errors| {
                errors
                    .data
                    .iter()
                    .map(|item| {
                        let message = item.message.as_deref().unwrap_or("unknown error");
                        match (&item.code, item.line) {
                            (Some(code), Some(line)) => format!("line {line}: {code}: {message}"),
                            (Some(code), None) => format!("{code}: {message}"),
                            (None, Some(line)) => format!("line {line}: {message}"),
                            (None, None) => message.to_string(),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        match (self.status.as_str(), details.is_empty()) {
            (_, false) => Some(details.join("; ")),
            ("failed" | "expired", true) => Some(format!("batch {}", self.status)),
            _ => None,
        }
    }

    fn into_remote(self) -> Result<RemoteBatch, ScoringServiceError> {
        let status = map_remote_status(&self.status).ok_or_else(|| {
            ScoringServiceError::UnexpectedResponse(format!(
                "unknown batch status `{}` for {}",
                self.status, self.id
            ))
        })?;
        let counts = self.request_counts.as_ref();
        let progress = BatchProgress {
            total: counts.map_or(0, |c| c.total),
            completed: counts.map_or(0, |c| c.completed),
            failed: counts.map_or(0, |c| c.failed),
        };
        let error = self.error_summary();
        Ok(RemoteBatch {
            created_at: self
                .created_at
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            handle: self.id,
            status,
            raw_status: self.status,
            progress,
            error,
        })
    }
}

impl OpenAiBatchClient {
    /// # Errors
    /// Fails when the HTTP client cannot be built or the base URL is invalid.
    pub fn new(settings: OpenAiSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build scoring service client")?;

        let mut base = settings.base_url;
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("invalid scoring service base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key,
            model: settings.model,
            completion_window: settings.completion_window,
            system_prompt: settings.system_prompt,
            response_format: clickbait::response_format(settings.max_score),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ScoringServiceError> {
        self.base_url.join(path).map_err(|error| {
            ScoringServiceError::InvalidRequest(format!("failed to build URL for {path}: {error}"))
        })
    }

    /// One JSONL line per request.
    fn build_jsonl(&self, requests: &[ScoreRequest]) -> Result<String, ScoringServiceError> {
        let mut jsonl = String::new();
        for request in requests {
            let line = json!({
                "custom_id": request.custom_id(),
                "method": "POST",
                "url": CHAT_COMPLETIONS_ENDPOINT,
                "body": {
                    "model": self.model,
                    "messages": [
                        { "role": "system", "content": self.system_prompt },
                        { "role": "user", "content": request.prompt }
                    ],
                    "response_format": self.response_format
                }
            });
            let encoded = serde_json::to_string(&line).map_err(|error| {
                ScoringServiceError::InvalidRequest(format!(
                    "failed to encode request {}: {error}",
                    request.custom_id()
                ))
            })?;
            jsonl.push_str(&encoded);
            jsonl.push('\n');
        }
        Ok(jsonl)
    }

    async fn upload_batch_file(&self, jsonl: String) -> Result<String, ScoringServiceError> {
        let part = Part::bytes(jsonl.into_bytes())
            .file_name(BATCH_FILE_NAME)
            .mime_str("application/jsonl")?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(self.url("files")?)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let file: FileObject = ensure_success(response).await?.json().await?;
        Ok(file.id)
    }

    async fn retrieve(&self, handle: &str) -> Result<BatchObject, ScoringServiceError> {
        let response = self
            .client
            .get(self.url(&format!("batches/{handle}"))?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn download_lines(&self, file_id: &str) -> Result<Vec<RawResult>, ScoringServiceError> {
        let response = self
            .client
            .get(self.url(&format!("files/{file_id}/content"))?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let text = ensure_success(response).await?.text().await?;
        Ok(parse_jsonl(&text))
    }
}

#[async_trait]
impl ScoringService for OpenAiBatchClient {
    async fn submit(&self, requests: &[ScoreRequest]) -> Result<JobHandle, ScoringServiceError> {
        if requests.is_empty() {
            return Err(ScoringServiceError::InvalidRequest(
                "refusing to submit an empty batch".to_string(),
            ));
        }

        let jsonl = self.build_jsonl(requests)?;
        let input_file_id = self.upload_batch_file(jsonl).await?;
        debug!(file_id = %input_file_id, requests = requests.len(), "uploaded batch input file");

        let response = self
            .client
            .post(self.url("batches")?)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "input_file_id": input_file_id,
                "endpoint": CHAT_COMPLETIONS_ENDPOINT,
                "completion_window": self.completion_window,
                "metadata": {
                    "description": "clickbait scoring",
                    "records": requests.len().to_string()
                }
            }))
            .send()
            .await?;
        let batch: BatchObject = ensure_success(response).await?.json().await?;

        info!(
            batch_id = %batch.id,
            status = %batch.status,
            requests = requests.len(),
            "created scoring batch"
        );
        Ok(batch.id)
    }

    async fn get_status(&self, handle: &str) -> Result<RemoteBatch, ScoringServiceError> {
        self.retrieve(handle).await?.into_remote()
    }

    async fn fetch_results(&self, handle: &str) -> Result<Vec<RawResult>, ScoringServiceError> {
        let batch = self.retrieve(handle).await?;
        if batch.status != "completed" {
            return Err(ScoringServiceError::ResultsUnavailable {
                handle: handle.to_string(),
                status: batch.status,
            });
        }
        if batch.output_file_id.is_none() && batch.error_file_id.is_none() {
            return Err(ScoringServiceError::ResultsUnavailable {
                handle: handle.to_string(),
                status: "completed without output file".to_string(),
            });
        }

        let mut results = Vec::new();
        if let Some(file_id) = batch.output_file_id.as_deref() {
            results.extend(self.download_lines(file_id).await?);
        }
        // Requests that failed at the service only appear in the error file.
        if let Some(file_id) = batch.error_file_id.as_deref() {
            results.extend(self.download_lines(file_id).await?);
        }

        debug!(batch_id = %handle, results = results.len(), "downloaded batch results");
        Ok(results)
    }

    async fn cancel(&self, handle: &str) -> Result<(), ScoringServiceError> {
        let response = self
            .client
            .post(self.url(&format!("batches/{handle}/cancel"))?)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let batch: BatchObject = ensure_success(response).await?.json().await?;
        info!(batch_id = %handle, status = %batch.status, "requested batch cancellation");
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<RemoteBatch>, ScoringServiceError> {
        let mut url = self.url("batches")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let list: BatchList = ensure_success(response).await?.json().await?;
        list.data.into_iter().map(BatchObject::into_remote).collect()
    }
}

async fn ensure_success(response: Response) -> Result<Response, ScoringServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ScoringServiceError::Api {
        status: status.as_u16(),
        body: truncate_error_message(&body),
    })
}

/// Lines that are not valid JSON become identifier-less results so the parser
/// reports them.
fn parse_jsonl(text: &str) -> Vec<RawResult> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<RawResult>(line).unwrap_or_else(|error| {
                warn!(line = index + 1, error = %error, "unparseable result line");
                RawResult {
                    custom_id: None,
                    response: None,
                    error: Some(json!({
                        "message": format!("invalid JSONL line {}: {error}", index + 1)
                    })),
                }
            })
        })
        .collect()
}

use std::{env, num::NonZeroUsize, time::Duration};

use thiserror::Error;

use crate::scoring::ParsePolicy;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    db_dsn: String,
    db_max_connections: u32,
    db_acquire_timeout: Duration,
    openai_api_key: String,
    openai_base_url: String,
    scoring_model: String,
    completion_window: String,
    http_timeout: Duration,
    fetch_limit: NonZeroUsize,
    min_batch_records: usize,
    score_max: i32,
    explanation_max_chars: usize,
    prompt_body_max_chars: usize,
    parse_policy: ParsePolicy,
    trigger_interval: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Read and validate the worker configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `CLICKSCORE_DB_DSN` or `OPENAI_API_KEY` is
    /// unset, or when a numeric/enum value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_dsn = env_var("CLICKSCORE_DB_DSN")?;
        let openai_api_key = env_var("OPENAI_API_KEY")?;
        let openai_base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/".to_string());
        let scoring_model = env::var("SCORING_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let completion_window =
            env::var("SCORING_COMPLETION_WINDOW").unwrap_or_else(|_| "24h".to_string());
        let http_timeout = parse_duration_ms("SCORING_HTTP_TIMEOUT_MS", 30_000)?;

        // Batch sizing
        let fetch_limit = parse_non_zero_usize("BATCH_FETCH_LIMIT", 800)?;
        let min_batch_records = parse_usize("BATCH_MIN_RECORDS", 1)?;

        // Result validation
        let score_max = parse_i32("SCORE_MAX", 100)?;
        if score_max <= 0 {
            return Err(ConfigError::Invalid {
                name: "SCORE_MAX",
                source: anyhow::anyhow!("must be greater than zero"),
            });
        }
        let explanation_max_chars = parse_usize("EXPLANATION_MAX_CHARS", 500)?;
        let prompt_body_max_chars = parse_usize("PROMPT_BODY_MAX_CHARS", 700)?;
        let parse_policy = parse_policy("PARSE_POLICY", ParsePolicy::Strict)?;

        // Database connection pool
        let db_max_connections = parse_u32("CLICKSCORE_DB_MAX_CONNECTIONS", 5)?;
        let db_acquire_timeout = parse_duration_secs("CLICKSCORE_DB_ACQUIRE_TIMEOUT_SECS", 30)?;

        let trigger_interval = parse_duration_secs("CLICKSCORE_TRIGGER_INTERVAL_SECS", 300)?;

        Ok(Self {
            db_dsn,
            db_max_connections,
            db_acquire_timeout,
            openai_api_key,
            openai_base_url,
            scoring_model,
            completion_window,
            http_timeout,
            fetch_limit,
            min_batch_records,
            score_max,
            explanation_max_chars,
            prompt_body_max_chars,
            parse_policy,
            trigger_interval,
        })
    }

    #[must_use]
    pub fn db_dsn(&self) -> &str {
        &self.db_dsn
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub fn db_acquire_timeout(&self) -> Duration {
        self.db_acquire_timeout
    }

    #[must_use]
    pub fn openai_api_key(&self) -> &str {
        &self.openai_api_key
    }

    #[must_use]
    pub fn openai_base_url(&self) -> &str {
        &self.openai_base_url
    }

    #[must_use]
    pub fn scoring_model(&self) -> &str {
        &self.scoring_model
    }

    #[must_use]
    pub fn completion_window(&self) -> &str {
        &self.completion_window
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    #[must_use]
    pub fn fetch_limit(&self) -> NonZeroUsize {
        self.fetch_limit
    }

    #[must_use]
    pub fn min_batch_records(&self) -> usize {
        self.min_batch_records
    }

    #[must_use]
    pub fn score_max(&self) -> i32 {
        self.score_max
    }

    #[must_use]
    pub fn explanation_max_chars(&self) -> usize {
        self.explanation_max_chars
    }

    #[must_use]
    pub fn prompt_body_max_chars(&self) -> usize {
        self.prompt_body_max_chars
    }

    #[must_use]
    pub fn parse_policy(&self) -> ParsePolicy {
        self.parse_policy
    }

    #[must_use]
    pub fn trigger_interval(&self) -> Duration {
        self.trigger_interval
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let value = parse_usize(name, default)?;
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(value))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_i32(name: &'static str, default: i32) -> Result<i32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<i32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_policy(name: &'static str, default: ParsePolicy) -> Result<ParsePolicy, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse::<ParsePolicy>().map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!(error),
        }),
        Err(_) => Ok(default),
    }
}

//! Postgres-backed stores.
//!
//! `articles` belongs to the scraper; this crate only reads unscored rows
//! and fills `clickbait_score`/`clickbait_explanation`. `scoring_batches` is
//! created by `migrations/0001_scoring_batches.sql`.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{
    error::StoreError,
    models::{Record, ScoringJob},
    traits::{JobStore, RecordStore},
};
use crate::lifecycle::JobStatus;
use crate::scoring::{RecordId, ScoreUpdate};

const JOB_COLUMNS: &str = "batch_id, status, input_count, created_at, completed_at, error_message";

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fetch_unscored(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            SELECT id, title, content, clickbait_score, clickbait_explanation, updated_at
            FROM articles
            WHERE clickbait_score IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count_unscored(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS unscored FROM articles WHERE clickbait_score IS NULL")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("unscored")?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative count {count}")))
    }

    async fn apply_score(&self, update: &ScoreUpdate) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE articles
            SET clickbait_score = $2,
                clickbait_explanation = $3,
                updated_at = NOW()
            WHERE id = $1
              AND clickbait_score IS NULL
            ",
        )
        .bind(update.record_id)
        .bind(update.score)
        .bind(&update.explanation)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn query_scored_status(
        &self,
        ids: &[RecordId],
    ) -> Result<HashSet<RecordId>, StoreError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT id FROM articles WHERE id = ANY($1) AND clickbait_score IS NOT NULL",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(StoreError::from))
            .collect()
    }
}

fn row_to_record(row: &PgRow) -> Result<Record, StoreError> {
    Ok(Record {
        id: row.try_get("id")?,
        title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
        body: row.try_get::<Option<String>, _>("content")?.unwrap_or_default(),
        score: row.try_get("clickbait_score")?,
        explanation: row.try_get("clickbait_explanation")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, handle: &str) -> Result<Option<JobStatus>, StoreError> {
        let row = sqlx::query("SELECT status FROM scoring_batches WHERE batch_id = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| parse_status(&row.try_get::<String, _>("status")?))
            .transpose()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find_non_terminal(&self) -> Result<Vec<ScoringJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scoring_batches \
             WHERE status IN ('pending', 'in_progress') \
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<ScoringJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scoring_batches WHERE batch_id = $1"
        ))
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn insert(&self, job: &ScoringJob) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO scoring_batches
                (batch_id, status, input_count, created_at, completed_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&job.handle)
        .bind(job.status.as_str())
        .bind(job.input_count)
        .bind(job.created_at)
        .bind(job.completed_at)
        .bind(job.error_message.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| map_unique_violation(error, &job.handle))?;

        Ok(())
    }

    async fn update_status(
        &self,
        handle: &str,
        expected: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<ScoringJob, StoreError> {
        let row = sqlx::query(&format!(
            r"
            UPDATE scoring_batches
            SET status = $3,
                error_message = CASE WHEN $3 = 'pending' THEN NULL
                                     ELSE COALESCE($4, error_message) END,
                completed_at = CASE WHEN $3 IN ('completed', 'failed', 'cancelled')
                                    THEN COALESCE(completed_at, NOW())
                                    ELSE NULL END,
                updated_at = NOW()
            WHERE batch_id = $1 AND status = $2
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(handle)
        .bind(expected.as_str())
        .bind(to.as_str())
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_unique_violation(error, handle))?;

        if let Some(row) = row {
            return row_to_job(&row);
        }

        match self.current_status(handle).await? {
            Some(actual) => Err(StoreError::StatusConflict {
                handle: handle.to_string(),
                expected,
                actual,
            }),
            None => Err(StoreError::JobNotFound(handle.to_string())),
        }
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ScoringJob>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scoring_batches ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }
}

fn map_unique_violation(error: sqlx::Error, handle: &str) -> StoreError {
    // 23505: the batch_id primary key or the single in-flight index.
    let unique_violation =
        matches!(&error, sqlx::Error::Database(db) if db.is_unique_violation());
    if unique_violation {
        StoreError::DuplicateJob {
            handle: handle.to_string(),
        }
    } else {
        StoreError::Database(error)
    }
}

fn parse_status(raw: &str) -> Result<JobStatus, StoreError> {
    raw.parse::<JobStatus>().map_err(StoreError::Corrupt)
}

fn row_to_job(row: &PgRow) -> Result<ScoringJob, StoreError> {
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(ScoringJob {
        handle: row.try_get("batch_id")?,
        status: parse_status(&status)?,
        input_count: row.try_get("input_count")?,
        created_at,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
    })
}

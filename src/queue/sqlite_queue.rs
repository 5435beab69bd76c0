use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    queue::{backoff_after, FailureDisposition, Job, JobQueue, JobStatus, RetryPolicy},
};

#[derive(FromRow)]
struct JobRow {
    id: String,
    topic: String,
    payload: String,
    status: String,
    attempts: i64,
    max_attempts: i64,
    backoff_ms: i64,
    run_at: NaiveDateTime,
    last_error: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    finished_at: Option<NaiveDateTime>,
}

const JOB_COLUMNS: &str = "id, topic, payload, status, attempts, max_attempts, backoff_ms, \
     run_at, last_error, created_at, updated_at, finished_at";

pub struct SqliteJobQueue {
    pool: SqlitePool,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: JobRow) -> Result<Job> {
        Ok(Job {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::TransientInfra(e.to_string()))?,
            topic: row.topic,
            payload: serde_json::from_str(&row.payload)
                .map_err(|e| AppError::PermanentProcessing(format!("Corrupt job payload: {}", e)))?,
            status: JobStatus::from_str(&row.status).ok_or_else(|| {
                AppError::TransientInfra(format!("Invalid job status: {}", row.status))
            })?,
            attempts: row.attempts as u32,
            max_attempts: row.max_attempts as u32,
            backoff_ms: row.backoff_ms as u64,
            run_at: DateTime::from_naive_utc_and_offset(row.run_at, Utc),
            last_error: row.last_error,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
            finished_at: row.finished_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, topic: &str, payload: serde_json::Value, policy: RetryPolicy) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, topic, payload, status, attempts, max_attempts,
                backoff_ms, run_at, created_at, updated_at
            ) VALUES (?, ?, ?, 'queued', 0, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(topic)
        .bind(payload.to_string())
        .bind(policy.max_attempts as i64)
        .bind(policy.initial_backoff_ms as i64)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(job_id = %id, topic, "Job enqueued");
        Ok(id)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_job(r)?)),
            None => Ok(None),
        }
    }

    async fn claim(&self, topic: &str) -> Result<Option<Job>> {
        let now = Utc::now().naive_utc();

        // Single statement: two workers can never claim the same row
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'running', attempts = attempts + 1, updated_at = ?1
            WHERE status = 'queued'
              AND id = (
                  SELECT id FROM jobs
                  WHERE topic = ?2 AND status = 'queued' AND run_at <= ?1
                  ORDER BY run_at ASC, created_at ASC
                  LIMIT 1
              )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(now)
        .bind(topic)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_job(r)?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', last_error = NULL, updated_at = ?, finished_at = ?
            WHERE id = ?
            "#
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<FailureDisposition> {
        let now = Utc::now();

        if retryable && job.has_attempts_left() {
            let run_at = now + backoff_after(job.backoff_ms, job.attempts);

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'queued', run_at = ?, last_error = ?, updated_at = ?
                WHERE id = ?
                "#
            )
            .bind(run_at.naive_utc())
            .bind(error)
            .bind(now.naive_utc())
            .bind(job.id.to_string())
            .execute(&self.pool)
            .await?;

            return Ok(FailureDisposition::Retrying {
                attempt: job.attempts,
                run_at,
            });
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = ?, updated_at = ?, finished_at = ?
            WHERE id = ?
            "#
        )
        .bind(error)
        .bind(now.naive_utc())
        .bind(now.naive_utc())
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(FailureDisposition::Parked)
    }

    async fn recover_stale(&self, lease: Duration) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let cutoff = (Utc::now() - lease).naive_utc();

        let mut tx = self.pool.begin().await?;

        let parked = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = 'worker lease expired', updated_at = ?, finished_at = ?
            WHERE status = 'running' AND updated_at < ? AND attempts >= max_attempts
            "#
        )
        .bind(now)
        .bind(now)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', run_at = ?, updated_at = ?
            WHERE status = 'running' AND updated_at < ?
            "#
        )
        .bind(now)
        .bind(now)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if parked.rows_affected() > 0 {
            tracing::warn!(count = parked.rows_affected(), "Parked stale jobs with no attempts left");
        }

        Ok(requeued.rows_affected())
    }

    async fn purge_finished(&self, retention: Duration) -> Result<u64> {
        let cutoff = (Utc::now() - retention).naive_utc();

        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('completed', 'failed') AND finished_at < ?
            "#
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_failed(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE status = 'failed' ORDER BY finished_at DESC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_job).collect()
    }

    async fn requeue(&self, id: Uuid) -> Result<Job> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', attempts = 0, run_at = ?, updated_at = ?, finished_at = NULL
            WHERE id = ? AND status = 'failed'
            "#
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(id).await? {
                Some(_) => Err(AppError::Conflict("Only parked jobs can be requeued".to_string())),
                None => Err(AppError::NotFound("Job not found".to_string())),
            };
        }

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::TransientInfra("Failed to retrieve requeued job".to_string())
        })
    }
}

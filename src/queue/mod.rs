//! Durable at-least-once job queue.
//!
//! Producers call [`JobQueue::enqueue`] with a topic, a JSON payload and a
//! [`RetryPolicy`]. A [`worker::Worker`] per topic claims jobs and hands them
//! to a [`worker::JobHandler`]. A job may be delivered more than once (after a
//! crash mid-job, or on retry), so every handler must be idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub mod sqlite_queue;
pub mod worker;

pub use sqlite_queue::SqliteJobQueue;
pub use worker::{JobHandler, JobOutcome, Worker, WorkerConfig};

pub const TOPIC_PAYMENT_EVENTS: &str = "payment-events";
pub const TOPIC_AUDIT: &str = "audit-log";
pub const TOPIC_NOTIFICATIONS: &str = "notifications";
pub const TOPIC_INVOICES: &str = "invoices";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s then 2s between them.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff_ms,
        }
    }

    /// Delay before the next run after `attempt` (1-based) has failed.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        backoff_after(self.initial_backoff_ms, attempt)
    }
}

const MAX_BACKOFF_MS: u64 = 24 * 60 * 60 * 1000;

pub(crate) fn backoff_after(initial_backoff_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let ms = initial_backoff_ms.saturating_mul(1u64 << exponent);
    Duration::milliseconds(ms.min(MAX_BACKOFF_MS) as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    /// Parked after a permanent error or exhausted retries.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Number of times this job has been claimed, including the current run.
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Decode the payload. A payload that does not decode will never decode,
    /// so this is a permanent failure.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            AppError::Validation(format!("Malformed {} job payload: {}", self.topic, e))
        })
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// What happened to a job after a failed run.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDisposition {
    Retrying { attempt: u32, run_at: DateTime<Utc> },
    Parked,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, topic: &str, payload: serde_json::Value, policy: RetryPolicy) -> Result<Uuid>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>>;
    /// Atomically move the oldest due job on `topic` to running.
    async fn claim(&self, topic: &str) -> Result<Option<Job>>;
    async fn complete(&self, id: Uuid) -> Result<()>;
    /// Record a failed run: schedule a retry when `retryable` and attempts
    /// remain, otherwise park the job.
    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<FailureDisposition>;
    /// Return jobs whose worker vanished mid-run to the queue.
    async fn recover_stale(&self, lease: Duration) -> Result<u64>;
    /// Delete parked and completed jobs finished before `now - retention`.
    async fn purge_finished(&self, retention: Duration) -> Result<u64>;
    async fn list_failed(&self, limit: i64) -> Result<Vec<Job>>;
    /// Put a parked job back in the queue with a fresh attempt budget.
    async fn requeue(&self, id: Uuid) -> Result<Job>;
}

/// Serialize `payload` and enqueue it.
pub async fn enqueue_json<T: Serialize + Sync>(
    queue: &dyn JobQueue,
    topic: &str,
    payload: &T,
    policy: RetryPolicy,
) -> Result<Uuid> {
    let value = serde_json::to_value(payload)
        .map_err(|e| AppError::Validation(format!("Unserializable {} payload: {}", topic, e)))?;
    queue.enqueue(topic, value, policy).await
}

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    queue::{FailureDisposition, Job, JobQueue},
};

/// Consumer contract. Delivery is at-least-once: `handle` must tolerate
/// seeing the same job again after a crash or retry.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn topic(&self) -> &'static str;
    async fn handle(&self, job: &Job) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    Retrying { attempt: u32 },
    Parked,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: StdDuration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: StdDuration::from_millis(500),
        }
    }
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        Self { queue, handler, config }
    }

    /// Poll until `shutdown` fires, running at most `concurrency` jobs at once.
    /// In-flight jobs are awaited before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        let topic = self.handler.topic();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        tracing::info!(topic, concurrency = self.config.concurrency, "Worker started");

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(topic, "Job task panicked: {}", e);
                }
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.queue.claim(topic).await {
                Ok(Some(job)) => {
                    let queue = self.queue.clone();
                    let handler = self.handler.clone();
                    in_flight.spawn(async move {
                        execute(queue.as_ref(), handler.as_ref(), job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::warn!(topic, "Failed to claim job: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!(topic, pending = in_flight.len(), "Worker stopping, draining in-flight jobs");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(topic, "Job task panicked: {}", e);
            }
        }
    }

    /// Claim and run one due job inline. Returns `None` when the topic is idle.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
        match self.queue.claim(self.handler.topic()).await? {
            Some(job) => Ok(Some(execute(self.queue.as_ref(), self.handler.as_ref(), job).await)),
            None => Ok(None),
        }
    }

    /// Run due jobs until the topic is idle. Retries scheduled in the future
    /// are left for later.
    pub async fn drain(&self) -> Result<Vec<JobOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.process_next().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

/// Run a claimed job and record the result on the queue.
pub async fn execute(queue: &dyn JobQueue, handler: &dyn JobHandler, job: Job) -> JobOutcome {
    let topic = handler.topic();

    let err = match handler.handle(&job).await {
        Ok(()) => {
            if let Err(e) = queue.complete(job.id).await {
                // Redelivery is harmless: handlers are idempotent
                tracing::warn!(job_id = %job.id, topic, "Failed to mark job completed: {}", e);
            }
            tracing::debug!(job_id = %job.id, topic, attempt = job.attempts, "Job completed");
            return JobOutcome::Completed;
        }
        Err(e) => e,
    };

    let retryable = err.is_retryable();
    if retryable {
        tracing::warn!(
            job_id = %job.id,
            topic,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            kind = err.kind(),
            payload = %job.payload,
            "Job failed: {}",
            err
        );
    } else {
        tracing::error!(
            job_id = %job.id,
            topic,
            attempt = job.attempts,
            kind = err.kind(),
            payload = %job.payload,
            "Job failed permanently: {}",
            err
        );
    }

    match queue.fail(&job, &format!("{}: {}", err.kind(), err), retryable).await {
        Ok(FailureDisposition::Retrying { attempt, run_at }) => {
            tracing::info!(job_id = %job.id, topic, attempt, %run_at, "Job scheduled for retry");
            JobOutcome::Retrying { attempt }
        }
        Ok(FailureDisposition::Parked) => {
            tracing::error!(job_id = %job.id, topic, attempts = job.attempts, "Job parked for inspection");
            JobOutcome::Parked
        }
        Err(e) => {
            // Row stays `running`; lease recovery will pick it up again
            tracing::error!(job_id = %job.id, topic, "Failed to record job failure: {}", e);
            JobOutcome::Retrying { attempt: job.attempts }
        }
    }
}

/// Periodic queue upkeep: requeue jobs whose worker died and purge finished
/// jobs past the retention window.
pub async fn run_maintenance(
    queue: Arc<dyn JobQueue>,
    retention: chrono::Duration,
    lease: chrono::Duration,
    interval: StdDuration,
    shutdown: CancellationToken,
) {
    loop {
        match queue.recover_stale(lease).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(count = n, "Requeued jobs with expired worker lease"),
            Err(e) => tracing::warn!("Stale job recovery failed: {}", e),
        }

        match queue.purge_finished(retention).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Purged finished jobs past retention"),
            Err(e) => tracing::warn!("Job purge failed: {}", e),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

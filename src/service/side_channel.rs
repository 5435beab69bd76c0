use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    domain::{AuditLogEntry, InvoiceJob, NotificationJob},
    queue::{enqueue_json, JobQueue, RetryPolicy, TOPIC_AUDIT, TOPIC_INVOICES, TOPIC_NOTIFICATIONS},
};

/// Fire-and-forget producer for audit records and downstream notification
/// jobs. Enqueue failures are logged and swallowed: the business operation
/// that triggered them has already committed.
pub struct SideChannel {
    queue: Arc<dyn JobQueue>,
    retry_policy: RetryPolicy,
}

impl SideChannel {
    pub fn new(queue: Arc<dyn JobQueue>, retry_policy: RetryPolicy) -> Self {
        Self { queue, retry_policy }
    }

    pub async fn audit(&self, entry: AuditLogEntry) -> Option<Uuid> {
        tracing::debug!(
            entity = %entry.entity,
            entity_id = %entry.entity_id,
            action = %entry.action,
            "Queueing audit entry"
        );
        self.enqueue(TOPIC_AUDIT, &entry).await
    }

    pub async fn notify(&self, job: NotificationJob) -> Option<Uuid> {
        self.enqueue(TOPIC_NOTIFICATIONS, &job).await
    }

    pub async fn request_invoice(&self, job: InvoiceJob) -> Option<Uuid> {
        self.enqueue(TOPIC_INVOICES, &job).await
    }

    async fn enqueue<T: Serialize + Sync>(&self, topic: &str, payload: &T) -> Option<Uuid> {
        match enqueue_json(self.queue.as_ref(), topic, payload, self.retry_policy).await {
            Ok(job_id) => Some(job_id),
            Err(e) => {
                tracing::error!(topic, "Failed to enqueue side-channel job: {}", e);
                None
            }
        }
    }
}

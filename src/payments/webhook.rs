use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    domain::{EventEnvelope, WebhookEvent},
    error::{AppError, Result},
    payments::signature::verify_signature,
    queue::{enqueue_json, JobQueue, RetryPolicy, TOPIC_PAYMENT_EVENTS},
};

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub job_id: Uuid,
    pub event_type: String,
}

/// HTTP-side half of webhook ingestion: authenticate, then hand the untouched
/// body to the queue. No business logic runs here.
pub struct WebhookReceiver {
    webhook_secret: Option<String>,
    queue: Arc<dyn JobQueue>,
    retry_policy: RetryPolicy,
}

impl WebhookReceiver {
    pub fn new(webhook_secret: Option<String>, queue: Arc<dyn JobQueue>, retry_policy: RetryPolicy) -> Self {
        Self {
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
            queue,
            retry_policy,
        }
    }

    pub async fn handle_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookAck> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Config("Webhook secret is not configured".to_string()))?;

        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Missing webhook signature header".to_string()))?;

        if !verify_signature(raw_body, signature, secret) {
            tracing::warn!(body_len = raw_body.len(), "Rejected webhook with invalid signature");
            return Err(AppError::Signature);
        }

        let envelope: EventEnvelope = serde_json::from_slice(raw_body)
            .map_err(|_| AppError::Validation("Webhook body is missing the event type".to_string()))?;

        let raw_payload = String::from_utf8(raw_body.to_vec())
            .map_err(|_| AppError::Validation("Webhook body is not valid UTF-8".to_string()))?;

        let event = WebhookEvent {
            event_type: envelope.event.clone(),
            raw_payload,
            verified: true,
            received_at: Utc::now(),
        };

        let job_id = enqueue_json(self.queue.as_ref(), TOPIC_PAYMENT_EVENTS, &event, self.retry_policy).await?;

        tracing::info!(%job_id, event_type = %envelope.event, "Webhook accepted");

        Ok(WebhookAck {
            status: "accepted",
            job_id,
            event_type: envelope.event,
        })
    }
}

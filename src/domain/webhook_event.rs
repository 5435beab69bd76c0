use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CapturedPayment;

/// Queue payload for a verified provider webhook. The raw body is kept
/// verbatim so a parked job shows exactly what the provider sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub raw_payload: String,
    pub verified: bool,
    pub received_at: DateTime<Utc>,
}

pub const EVENT_PAYMENT_CAPTURED: &str = "payment.captured";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";

/// Minimal envelope: only the routing key is read at the HTTP boundary.
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
}

#[derive(Debug, Deserialize)]
pub struct ProviderEvent {
    pub event: String,
    pub payload: ProviderEventPayload,
}

#[derive(Debug, Deserialize)]
pub struct ProviderEventPayload {
    pub payment: Option<EntityWrapper<ProviderPayment>>,
}

#[derive(Debug, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    // Provider sends `[]` when no notes were attached to the order
    #[serde(default, deserialize_with = "notes_or_empty")]
    pub notes: PaymentNotes,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentNotes {
    pub subscription_id: Option<String>,
}

fn notes_or_empty<'de, D>(deserializer: D) -> Result<PaymentNotes, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Object(_) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(PaymentNotes::default()),
    }
}

impl ProviderPayment {
    pub fn to_capture(&self) -> Option<CapturedPayment> {
        Some(CapturedPayment {
            provider_order_id: self.order_id.clone()?,
            provider_payment_id: self.id.clone(),
            amount: self.amount,
            currency: self.currency.clone(),
            method: self.method.clone().unwrap_or_else(|| "unknown".to_string()),
            subscription_id: self
                .notes
                .subscription_id
                .as_deref()
                .and_then(|s| Uuid::parse_str(s).ok()),
        })
    }
}

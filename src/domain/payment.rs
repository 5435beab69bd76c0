use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: String,
    pub settlement_status: SettlementStatus,
    pub settlement_id: Option<Uuid>,
    pub subscription_id: Uuid,
    pub gym_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A freshly captured payment, not yet part of any settlement.
    pub fn captured(capture: &CapturedPayment, subscription: &super::Subscription) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_order_id: capture.provider_order_id.clone(),
            provider_payment_id: capture.provider_payment_id.clone(),
            amount: capture.amount,
            currency: capture.currency.clone(),
            status: PaymentStatus::Captured,
            method: capture.method.clone(),
            settlement_status: SettlementStatus::Unsettled,
            settlement_id: None,
            subscription_id: subscription.id,
            gym_id: subscription.gym_id,
            user_id: subscription.user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields the processor extracts from a provider capture event.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPayment {
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub subscription_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Captured,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(PaymentStatus::Created),
            "captured" => Some(PaymentStatus::Captured),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Unsettled,
    Settled,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Unsettled => "unsettled",
            SettlementStatus::Settled => "settled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unsettled" => Some(SettlementStatus::Unsettled),
            "settled" => Some(SettlementStatus::Settled),
            _ => None,
        }
    }
}

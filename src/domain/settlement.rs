use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub gym_id: Uuid,
    /// Sum of member payment amounts, fixed at creation.
    pub amount: i64,
    pub payment_count: i64,
    pub status: SettlementState,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementState {
    Pending,
    Processed,
    Failed,
}

impl SettlementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementState::Pending => "pending",
            SettlementState::Processed => "processed",
            SettlementState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SettlementState::Pending),
            "processed" => Some(SettlementState::Processed),
            "failed" => Some(SettlementState::Failed),
            _ => None,
        }
    }

    /// A failed payout may be retried; a processed one is final.
    pub fn can_transition_to(&self, next: SettlementState) -> bool {
        use SettlementState::*;
        matches!(
            (self, next),
            (Pending, Processed) | (Pending, Failed) | (Failed, Processed)
        )
    }
}

/// Result of asking the engine to settle a gym.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Created(Settlement),
    NothingToSettle { gym_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSettlementRequest {
    pub gym_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProcessSettlementRequest {
    #[validate(length(min = 1, max = 128))]
    pub transaction_id: String,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FailSettlementRequest {
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettlementFilter {
    pub gym_id: Option<Uuid>,
    pub status: Option<SettlementState>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnsettledAmount {
    pub gym_id: Uuid,
    pub amount: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GymUnsettledTotal {
    pub gym_id: Uuid,
    pub gym_name: String,
    pub amount: i64,
    pub count: i64,
}

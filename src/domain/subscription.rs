use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub access_code: Option<String>,
    pub payment_id: Option<Uuid>,
    pub provider_order_id: Option<String>,
    pub order_amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubscriptionStatus::Pending),
            "active" => Some(SubscriptionStatus::Active),
            "expired" => Some(SubscriptionStatus::Expired),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }

    /// Lifecycle edges. Expiry is driven by an external sweep but is still a
    /// legal edge so that sweep can share this table.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Cancelled) | (Active, Expired) | (Active, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Expired | SubscriptionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub user_id: Uuid,
    pub gym_id: Uuid,
    pub plan_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, Validate)]
pub struct CancelSubscriptionRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Dates and code stamped onto a subscription when it becomes active.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub subscription_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Used only when the subscription has no code yet.
    pub access_code: String,
    pub payment_id: Option<Uuid>,
}

// Crockford-style alphabet: no 0/O, 1/I/L, U
const ACCESS_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTVWXYZ";
pub const ACCESS_CODE_LEN: usize = 8;

/// Short code members type in at the front desk.
pub fn generate_access_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ACCESS_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ACCESS_CODE_ALPHABET.len());
            ACCESS_CODE_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_edges() {
        use SubscriptionStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Expired));

        assert!(!Active.can_transition_to(Active));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Expired));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Active));
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn test_access_code_shape() {
        for _ in 0..100 {
            let code = generate_access_code();
            assert_eq!(code.len(), ACCESS_CODE_LEN);
            assert!(code.bytes().all(|b| ACCESS_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(SubscriptionStatus::Cancelled.as_str(), "cancelled");
        assert_eq!(SubscriptionStatus::from_str("active"), Some(SubscriptionStatus::Active));
        assert_eq!(SubscriptionStatus::from_str("Active"), None);
    }
}

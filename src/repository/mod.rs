use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod audit_repository;
pub mod gym_repository;
pub mod payment_repository;
pub mod settlement_repository;
pub mod subscription_repository;

pub use audit_repository::SqliteAuditRepository;
pub use gym_repository::SqliteGymRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use settlement_repository::SqliteSettlementRepository;
pub use subscription_repository::SqliteSubscriptionRepository;

#[async_trait]
pub trait GymRepository: Send + Sync {
    async fn create_gym(&self, request: CreateGymRequest) -> Result<Gym>;
    async fn find_gym(&self, id: Uuid) -> Result<Option<Gym>>;
    async fn create_plan(&self, request: CreatePlanRequest) -> Result<Plan>;
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: Subscription) -> Result<Subscription>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>>;
    async fn find_by_provider_order_id(&self, order_id: &str) -> Result<Option<Subscription>>;
    async fn find_active(&self, user_id: Uuid, gym_id: Uuid) -> Result<Option<Subscription>>;
    /// pending -> active. `Ok(None)` when the row was no longer pending.
    async fn activate(&self, activation: &Activation) -> Result<Option<Subscription>>;
    /// Guarded status change; `Ok(None)` when the current status is not in `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
    ) -> Result<Option<Subscription>>;
}

/// Outcome of recording a capture.
#[derive(Debug, Clone)]
pub enum CaptureRecord {
    Recorded {
        payment: Payment,
        /// Set when this capture moved the subscription to active.
        activated: Option<Subscription>,
    },
    /// Another delivery of the same (order, payment) already committed.
    Duplicate,
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_provider_ids(&self, order_id: &str, payment_id: &str) -> Result<Option<Payment>>;
    async fn list_by_settlement(&self, settlement_id: Uuid) -> Result<Vec<Payment>>;
    async fn list_by_gym(&self, gym_id: Uuid) -> Result<Vec<Payment>>;
    /// Insert the payment and, when `activation` is given, activate its
    /// pending subscription, as one transaction.
    async fn record_capture(&self, payment: Payment, activation: Option<Activation>) -> Result<CaptureRecord>;
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Claim every unsettled captured payment of the gym into a new pending
    /// settlement. `Ok(None)` when there was nothing to claim.
    async fn create_for_gym(&self, gym_id: Uuid) -> Result<Option<Settlement>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Settlement>>;
    async fn list(&self, filter: &SettlementFilter) -> Result<Vec<Settlement>>;
    /// Guarded status change; `Ok(None)` when the current status is not in `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: &[SettlementState],
        to: SettlementState,
        transaction_id: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Option<Settlement>>;
    async fn unsettled_amount(&self, gym_id: Uuid) -> Result<UnsettledAmount>;
    async fn unsettled_summary(&self) -> Result<Vec<GymUnsettledTotal>>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()>;
    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>>;
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::PermanentProcessing(format!("Corrupt id {}: {}", s, e)))
}

pub(crate) fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(dt, Utc)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// SQL placeholder list for an `IN (...)` clause.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{
        AuditLogEntry, FailSettlementRequest, GymUnsettledTotal, Payment, ProcessSettlementRequest,
        Settlement, SettlementFilter, SettlementOutcome, SettlementState, UnsettledAmount,
    },
    error::{AppError, Result},
    repository::{GymRepository, PaymentRepository, SettlementRepository},
    service::side_channel::SideChannel,
};

#[derive(Debug, Clone, Serialize)]
pub struct SettlementDetail {
    pub settlement: Settlement,
    pub payments: Vec<Payment>,
}

/// Batches a gym's unsettled captured payments into payout settlements.
///
/// Creation for one gym runs under an in-process lock per gym. The repository
/// claims rows with a conditional update, so member sets stay disjoint across
/// processes too.
pub struct SettlementService {
    gym_repo: Arc<dyn GymRepository>,
    settlement_repo: Arc<dyn SettlementRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    side_channel: Arc<SideChannel>,
    gym_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SettlementService {
    pub fn new(
        gym_repo: Arc<dyn GymRepository>,
        settlement_repo: Arc<dyn SettlementRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        side_channel: Arc<SideChannel>,
    ) -> Self {
        Self {
            gym_repo,
            settlement_repo,
            payment_repo,
            side_channel,
            gym_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn gym_lock(&self, gym_id: Uuid) -> Arc<Mutex<()>> {
        self.gym_locks.lock().await.entry(gym_id).or_default().clone()
    }

    /// Drops the caller's handle and forgets the lock once nobody else holds
    /// or waits on it. Handles are only cloned under the map lock.
    async fn release_gym_lock(&self, gym_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.gym_locks.lock().await;
        drop(lock);
        if locks.get(&gym_id).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(&gym_id);
        }
    }

    async fn ensure_gym(&self, gym_id: Uuid) -> Result<()> {
        self.gym_repo
            .find_gym(gym_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))
    }

    pub async fn create_settlement(&self, gym_id: Uuid, actor_id: Option<Uuid>) -> Result<SettlementOutcome> {
        self.ensure_gym(gym_id).await?;

        let lock = self.gym_lock(gym_id).await;
        let claimed = {
            let _guard = lock.lock().await;
            self.settlement_repo.create_for_gym(gym_id).await
        };
        self.release_gym_lock(gym_id, lock).await;
        let settlement = claimed?;

        let Some(settlement) = settlement else {
            tracing::info!(gym_id = %gym_id, "No unsettled payments, nothing to settle");
            return Ok(SettlementOutcome::NothingToSettle { gym_id });
        };

        tracing::info!(
            settlement_id = %settlement.id,
            gym_id = %gym_id,
            amount = settlement.amount,
            payment_count = settlement.payment_count,
            "Settlement created"
        );

        self.side_channel
            .audit(AuditLogEntry::new(
                actor_id,
                "settlement",
                settlement.id,
                "SETTLEMENT_CREATED",
                json!({
                    "gym_id": gym_id,
                    "amount": settlement.amount,
                    "payment_count": settlement.payment_count,
                }),
            ))
            .await;

        Ok(SettlementOutcome::Created(settlement))
    }

    /// Record the payout. A failed payout may be processed on retry; a
    /// processed one is final.
    pub async fn process_settlement(
        &self,
        id: Uuid,
        request: ProcessSettlementRequest,
        actor_id: Option<Uuid>,
    ) -> Result<Settlement> {
        request.validate()?;

        let current = self.get_settlement(id).await?;
        if !current.status.can_transition_to(SettlementState::Processed) {
            return Err(AppError::Conflict(format!(
                "Settlement is already {}",
                current.status.as_str()
            )));
        }

        let processed = self
            .settlement_repo
            .transition(
                id,
                &[SettlementState::Pending, SettlementState::Failed],
                SettlementState::Processed,
                Some(&request.transaction_id),
                request.notes.as_deref(),
            )
            .await?
            .ok_or_else(|| AppError::Conflict("Settlement is already processed".to_string()))?;

        tracing::info!(
            settlement_id = %id,
            gym_id = %processed.gym_id,
            transaction_id = %request.transaction_id,
            "Settlement processed"
        );

        self.side_channel
            .audit(AuditLogEntry::new(
                actor_id,
                "settlement",
                id,
                "SETTLEMENT_PROCESSED",
                json!({
                    "previous_status": current.status,
                    "transaction_id": request.transaction_id,
                    "notes": request.notes,
                    "amount": processed.amount,
                }),
            ))
            .await;

        Ok(processed)
    }

    /// pending -> failed. Payments stay attached so the payout can be retried.
    pub async fn fail_settlement(
        &self,
        id: Uuid,
        request: FailSettlementRequest,
        actor_id: Option<Uuid>,
    ) -> Result<Settlement> {
        request.validate()?;

        let current = self.get_settlement(id).await?;
        if !current.status.can_transition_to(SettlementState::Failed) {
            return Err(AppError::Conflict(format!(
                "Cannot fail a {} settlement",
                current.status.as_str()
            )));
        }

        let failed = self
            .settlement_repo
            .transition(
                id,
                &[SettlementState::Pending],
                SettlementState::Failed,
                None,
                request.notes.as_deref(),
            )
            .await?
            .ok_or_else(|| AppError::Conflict("Settlement changed state, try again".to_string()))?;

        tracing::warn!(settlement_id = %id, gym_id = %failed.gym_id, "Settlement payout failed");

        self.side_channel
            .audit(AuditLogEntry::new(
                actor_id,
                "settlement",
                id,
                "SETTLEMENT_FAILED",
                json!({ "notes": request.notes }),
            ))
            .await;

        Ok(failed)
    }

    pub async fn get_settlement(&self, id: Uuid) -> Result<Settlement> {
        self.settlement_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Settlement not found".to_string()))
    }

    pub async fn get_settlement_detail(&self, id: Uuid) -> Result<SettlementDetail> {
        let settlement = self.get_settlement(id).await?;
        let payments = self.payment_repo.list_by_settlement(id).await?;
        Ok(SettlementDetail { settlement, payments })
    }

    pub async fn list_settlements(&self, filter: &SettlementFilter) -> Result<Vec<Settlement>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(AppError::Validation("`from` must not be after `to`".to_string()));
            }
        }
        self.settlement_repo.list(filter).await
    }

    pub async fn get_unsettled_amount(&self, gym_id: Uuid) -> Result<UnsettledAmount> {
        self.ensure_gym(gym_id).await?;
        self.settlement_repo.unsettled_amount(gym_id).await
    }

    pub async fn get_unsettled_summary(&self) -> Result<Vec<GymUnsettledTotal>> {
        self.settlement_repo.unsettled_summary().await
    }
}

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::{
        generate_access_code, AccessCodeNotice, Activation, AuditLogEntry, CancelSubscriptionRequest,
        CreateSubscriptionRequest, Gym, NotificationJob, Plan, Subscription, SubscriptionStatus,
    },
    error::{AppError, Result},
    payments::{OrderRequest, PaymentGateway, ProviderOrder},
    repository::{GymRepository, SubscriptionRepository},
    service::side_channel::SideChannel,
};

/// A pending subscription plus the provider order the member pays against.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCheckout {
    pub subscription: Subscription,
    pub order: ProviderOrder,
}

pub struct SubscriptionService {
    gym_repo: Arc<dyn GymRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    side_channel: Arc<SideChannel>,
}

impl SubscriptionService {
    pub fn new(
        gym_repo: Arc<dyn GymRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        side_channel: Arc<SideChannel>,
    ) -> Self {
        Self {
            gym_repo,
            subscription_repo,
            gateway,
            side_channel,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Subscription> {
        self.subscription_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    /// Create a pending subscription and the provider order that pays for it.
    pub async fn request_subscription(
        &self,
        request: CreateSubscriptionRequest,
        actor_id: Option<Uuid>,
    ) -> Result<SubscriptionCheckout> {
        let plan = self
            .gym_repo
            .find_plan(request.plan_id)
            .await?
            .filter(|plan| plan.gym_id == request.gym_id && plan.is_active)
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        self.gym_repo
            .find_gym(request.gym_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gym not found".to_string()))?;

        if self
            .subscription_repo
            .find_active(request.user_id, request.gym_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User already has an active subscription at this gym".to_string(),
            ));
        }

        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| AppError::Config("Payment gateway is not configured".to_string()))?;

        let subscription_id = Uuid::new_v4();
        let notes = HashMap::from([
            ("subscription_id".to_string(), subscription_id.to_string()),
            ("gym_id".to_string(), request.gym_id.to_string()),
            ("user_id".to_string(), request.user_id.to_string()),
        ]);

        let order = gateway
            .create_order(OrderRequest {
                amount: plan.price,
                currency: plan.currency.clone(),
                receipt: format!("sub_{}", subscription_id.simple()),
                notes,
            })
            .await?;

        let now = Utc::now();
        let subscription = self
            .subscription_repo
            .create(Subscription {
                id: subscription_id,
                user_id: request.user_id,
                gym_id: request.gym_id,
                plan_id: plan.id,
                status: SubscriptionStatus::Pending,
                start_date: None,
                end_date: None,
                access_code: None,
                payment_id: None,
                provider_order_id: Some(order.id.clone()),
                order_amount: plan.price,
                currency: plan.currency.clone(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            gym_id = %subscription.gym_id,
            order_id = %order.id,
            amount = plan.price,
            "Subscription requested"
        );

        self.side_channel
            .audit(AuditLogEntry::new(
                actor_id,
                "subscription",
                subscription.id,
                "SUBSCRIPTION_REQUESTED",
                json!({
                    "user_id": subscription.user_id,
                    "gym_id": subscription.gym_id,
                    "plan_id": subscription.plan_id,
                    "provider_order_id": order.id,
                    "amount": plan.price,
                }),
            ))
            .await;

        Ok(SubscriptionCheckout { subscription, order })
    }

    /// pending -> active without a payment, e.g. for cash at the desk.
    pub async fn activate_manually(&self, id: Uuid, actor_id: Uuid) -> Result<Subscription> {
        let subscription = self.get(id).await?;
        ensure_transition(&subscription, SubscriptionStatus::Active)?;

        if self
            .subscription_repo
            .find_active(subscription.user_id, subscription.gym_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User already has an active subscription at this gym".to_string(),
            ));
        }

        let plan = self
            .gym_repo
            .find_plan(subscription.plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        let activation = build_activation(&subscription, &plan, Utc::now(), None)?;
        let activated = self
            .subscription_repo
            .activate(&activation)
            .await?
            .ok_or_else(|| AppError::Conflict("Subscription is no longer pending".to_string()))?;

        tracing::info!(subscription_id = %id, actor_id = %actor_id, "Subscription activated manually");

        self.side_channel
            .audit(AuditLogEntry::new(
                Some(actor_id),
                "subscription",
                id,
                "SUBSCRIPTION_ACTIVATED",
                json!({
                    "manual": true,
                    "start_date": activated.start_date,
                    "end_date": activated.end_date,
                }),
            ))
            .await;

        match self.gym_repo.find_gym(activated.gym_id).await {
            Ok(Some(gym)) => {
                if let Some(notice) = access_code_notice(&activated, &gym, &plan) {
                    self.side_channel.notify(NotificationJob::WhatsAppAccessCode(notice)).await;
                }
            }
            Ok(None) => tracing::warn!(gym_id = %activated.gym_id, "Gym missing, access code not sent"),
            Err(e) => tracing::warn!(gym_id = %activated.gym_id, "Gym lookup failed, access code not sent: {}", e),
        }

        Ok(activated)
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        actor_id: Uuid,
        request: CancelSubscriptionRequest,
    ) -> Result<Subscription> {
        let subscription = self.get(id).await?;
        ensure_transition(&subscription, SubscriptionStatus::Cancelled)?;

        let cancelled = self
            .subscription_repo
            .transition(
                id,
                &[SubscriptionStatus::Pending, SubscriptionStatus::Active],
                SubscriptionStatus::Cancelled,
            )
            .await?
            .ok_or_else(|| AppError::Conflict("Subscription changed state, try again".to_string()))?;

        tracing::info!(subscription_id = %id, actor_id = %actor_id, "Subscription cancelled");

        self.side_channel
            .audit(AuditLogEntry::new(
                Some(actor_id),
                "subscription",
                id,
                "SUBSCRIPTION_CANCELLED",
                json!({
                    "previous_status": subscription.status,
                    "reason": request.reason,
                }),
            ))
            .await;

        Ok(cancelled)
    }
}

fn ensure_transition(subscription: &Subscription, next: SubscriptionStatus) -> Result<()> {
    if subscription.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Cannot move subscription from {} to {}",
            subscription.status.as_str(),
            next.as_str()
        )))
    }
}

/// Dates and access code for activating `subscription` at `start`. An existing
/// code is kept.
pub(crate) fn build_activation(
    subscription: &Subscription,
    plan: &Plan,
    start: DateTime<Utc>,
    payment_id: Option<Uuid>,
) -> Result<Activation> {
    let end_date = plan.end_date_from(start).ok_or_else(|| {
        AppError::PermanentProcessing(format!("Plan {} duration overflows the calendar", plan.id))
    })?;

    Ok(Activation {
        subscription_id: subscription.id,
        start_date: start,
        end_date,
        access_code: subscription
            .access_code
            .clone()
            .unwrap_or_else(generate_access_code),
        payment_id,
    })
}

pub(crate) fn access_code_notice(subscription: &Subscription, gym: &Gym, plan: &Plan) -> Option<AccessCodeNotice> {
    Some(AccessCodeNotice {
        user_id: subscription.user_id,
        subscription_id: subscription.id,
        gym_id: gym.id,
        gym_name: gym.name.clone(),
        plan_name: plan.name.clone(),
        access_code: subscription.access_code.clone()?,
        end_date: subscription.end_date?,
    })
}

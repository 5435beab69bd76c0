use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::{
        AuditLogEntry, CapturedPayment, InvoiceJob, NotificationJob, Payment, Plan, ProviderEvent,
        ProviderPayment, Subscription, SubscriptionStatus, WebhookEvent, EVENT_PAYMENT_CAPTURED,
        EVENT_PAYMENT_FAILED,
    },
    error::{AppError, Result},
    queue::{Job, JobHandler, TOPIC_PAYMENT_EVENTS},
    repository::{CaptureRecord, GymRepository, PaymentRepository, SubscriptionRepository},
    service::{
        side_channel::SideChannel,
        subscription_service::{access_code_notice, build_activation},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Payment recorded and its subscription moved to active.
    Activated { payment_id: Uuid, subscription_id: Uuid },
    /// Payment recorded; the subscription was not pending and was left alone.
    Recorded { payment_id: Uuid },
    /// This (order, payment) pair was already recorded.
    Duplicate,
    FailureRecorded,
    Ignored { event_type: String },
}

/// Consumer for `payment-events`. Safe under redelivery: the (order, payment)
/// pair is checked up front and enforced again by a unique index.
pub struct PaymentProcessor {
    gym_repo: Arc<dyn GymRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    side_channel: Arc<SideChannel>,
}

impl PaymentProcessor {
    pub fn new(
        gym_repo: Arc<dyn GymRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        side_channel: Arc<SideChannel>,
    ) -> Self {
        Self {
            gym_repo,
            subscription_repo,
            payment_repo,
            side_channel,
        }
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<ProcessOutcome> {
        if !event.verified {
            return Err(AppError::Validation("Refusing to process an unverified event".to_string()));
        }

        let parsed: ProviderEvent = serde_json::from_str(&event.raw_payload)
            .map_err(|e| AppError::Validation(format!("Malformed provider event: {}", e)))?;

        match parsed.event.as_str() {
            EVENT_PAYMENT_CAPTURED => {
                let payment = payment_entity(parsed)?;
                self.handle_captured(&payment).await
            }
            EVENT_PAYMENT_FAILED => {
                let payment = payment_entity(parsed)?;
                self.handle_failed(&payment).await
            }
            other => {
                tracing::debug!(event_type = other, "Ignoring unhandled provider event");
                Ok(ProcessOutcome::Ignored {
                    event_type: other.to_string(),
                })
            }
        }
    }

    async fn handle_captured(&self, entity: &ProviderPayment) -> Result<ProcessOutcome> {
        let capture = entity.to_capture().ok_or_else(|| {
            AppError::Validation(format!("Captured payment {} has no order id", entity.id))
        })?;

        if self
            .payment_repo
            .find_by_provider_ids(&capture.provider_order_id, &capture.provider_payment_id)
            .await?
            .is_some()
        {
            tracing::info!(
                order_id = %capture.provider_order_id,
                payment_id = %capture.provider_payment_id,
                "Duplicate capture, already recorded"
            );
            return Ok(ProcessOutcome::Duplicate);
        }

        let subscription = self.resolve_subscription(&capture).await?;

        if capture.amount != subscription.order_amount {
            return Err(AppError::PermanentProcessing(format!(
                "Captured amount {} does not match order amount {} for subscription {}",
                capture.amount, subscription.order_amount, subscription.id
            )));
        }
        if !capture.currency.eq_ignore_ascii_case(&subscription.currency) {
            return Err(AppError::PermanentProcessing(format!(
                "Captured currency {} does not match order currency {} for subscription {}",
                capture.currency, subscription.currency, subscription.id
            )));
        }

        let payment = Payment::captured(&capture, &subscription);

        let plan = if subscription.status == SubscriptionStatus::Pending {
            Some(
                self.gym_repo
                    .find_plan(subscription.plan_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", subscription.plan_id)))?,
            )
        } else {
            tracing::warn!(
                subscription_id = %subscription.id,
                status = subscription.status.as_str(),
                "Capture for a subscription that is not pending; recording payment only"
            );
            None
        };

        let activation = plan
            .as_ref()
            .map(|plan| build_activation(&subscription, plan, Utc::now(), Some(payment.id)))
            .transpose()?;

        let (payment, activated) = match self.payment_repo.record_capture(payment, activation).await? {
            CaptureRecord::Duplicate => {
                tracing::info!(
                    order_id = %capture.provider_order_id,
                    payment_id = %capture.provider_payment_id,
                    "Duplicate capture lost the insert race"
                );
                return Ok(ProcessOutcome::Duplicate);
            }
            CaptureRecord::Recorded { payment, activated } => (payment, activated),
        };

        tracing::info!(
            payment_id = %payment.id,
            subscription_id = %subscription.id,
            gym_id = %payment.gym_id,
            amount = payment.amount,
            activated = activated.is_some(),
            "Payment captured"
        );

        self.side_channel
            .audit(AuditLogEntry::new(
                None,
                "payment",
                payment.id,
                "PAYMENT_CAPTURED",
                json!({
                    "provider_order_id": payment.provider_order_id,
                    "provider_payment_id": payment.provider_payment_id,
                    "amount": payment.amount,
                    "currency": payment.currency,
                    "subscription_id": subscription.id,
                    "activated": activated.is_some(),
                }),
            ))
            .await;

        let Some(activated) = activated else {
            if plan.is_some() {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    "Subscription left pending state before activation; payment recorded only"
                );
            }
            return Ok(ProcessOutcome::Recorded { payment_id: payment.id });
        };

        self.after_activation(&activated, &payment, plan.as_ref()).await;

        Ok(ProcessOutcome::Activated {
            payment_id: payment.id,
            subscription_id: activated.id,
        })
    }

    async fn after_activation(&self, subscription: &Subscription, payment: &Payment, plan: Option<&Plan>) {
        self.side_channel
            .audit(AuditLogEntry::new(
                None,
                "subscription",
                subscription.id,
                "SUBSCRIPTION_ACTIVATED",
                json!({
                    "payment_id": payment.id,
                    "start_date": subscription.start_date,
                    "end_date": subscription.end_date,
                }),
            ))
            .await;

        match (self.gym_repo.find_gym(subscription.gym_id).await, plan) {
            (Ok(Some(gym)), Some(plan)) => {
                if let Some(notice) = access_code_notice(subscription, &gym, plan) {
                    self.side_channel.notify(NotificationJob::WhatsAppAccessCode(notice)).await;
                }
            }
            (Ok(_), _) => {
                tracing::warn!(subscription_id = %subscription.id, "Gym or plan missing, access code not sent");
            }
            (Err(e), _) => {
                tracing::warn!(subscription_id = %subscription.id, "Gym lookup failed, access code not sent: {}", e);
            }
        }

        self.side_channel
            .request_invoice(InvoiceJob {
                subscription_id: subscription.id,
                payment_id: payment.id,
            })
            .await;
    }

    async fn handle_failed(&self, entity: &ProviderPayment) -> Result<ProcessOutcome> {
        tracing::info!(
            payment_id = %entity.id,
            order_id = ?entity.order_id,
            reason = ?entity.error_description,
            "Provider reported failed payment"
        );

        self.side_channel
            .audit(AuditLogEntry::new(
                None,
                "payment",
                &entity.id,
                "PAYMENT_FAILED",
                json!({
                    "provider_order_id": entity.order_id,
                    "provider_payment_id": entity.id,
                    "amount": entity.amount,
                    "currency": entity.currency,
                    "error_description": entity.error_description,
                }),
            ))
            .await;

        Ok(ProcessOutcome::FailureRecorded)
    }

    /// The `subscription_id` note wins; the order id is the fallback for
    /// orders created without notes.
    async fn resolve_subscription(&self, capture: &CapturedPayment) -> Result<Subscription> {
        let by_note = match capture.subscription_id {
            Some(id) => self.subscription_repo.find_by_id(id).await?,
            None => None,
        };

        let subscription = match by_note {
            Some(subscription) => subscription,
            None => self
                .subscription_repo
                .find_by_provider_order_id(&capture.provider_order_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "No subscription for order {}",
                        capture.provider_order_id
                    ))
                })?,
        };

        if let Some(order_id) = &subscription.provider_order_id {
            if order_id != &capture.provider_order_id {
                return Err(AppError::PermanentProcessing(format!(
                    "Order {} does not belong to subscription {}",
                    capture.provider_order_id, subscription.id
                )));
            }
        }

        Ok(subscription)
    }
}

fn payment_entity(event: ProviderEvent) -> Result<ProviderPayment> {
    event
        .payload
        .payment
        .map(|wrapper| wrapper.entity)
        .ok_or_else(|| AppError::Validation(format!("{} event has no payment entity", event.event)))
}

#[async_trait]
impl JobHandler for PaymentProcessor {
    fn topic(&self) -> &'static str {
        TOPIC_PAYMENT_EVENTS
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let event: WebhookEvent = job.payload_as()?;
        let outcome = self.process(&event).await?;
        tracing::debug!(job_id = %job.id, event_type = %event.event_type, ?outcome, "Payment event processed");
        Ok(())
    }
}

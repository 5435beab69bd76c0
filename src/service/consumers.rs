use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{AuditLogEntry, InvoiceJob, InvoiceNotice, InvoiceRequest, NotificationJob},
    error::{AppError, Result},
    integrations::{IntegrationManager, InvoiceGenerator, NotificationDispatcher},
    queue::{Job, JobHandler, TOPIC_AUDIT, TOPIC_INVOICES, TOPIC_NOTIFICATIONS},
    repository::{AuditRepository, GymRepository, PaymentRepository, SubscriptionRepository},
    service::side_channel::SideChannel,
};

/// Persists queued audit entries. Appends are keyed by entry id, so a
/// redelivered job writes nothing new.
pub struct AuditConsumer {
    audit_repo: Arc<dyn AuditRepository>,
}

impl AuditConsumer {
    pub fn new(audit_repo: Arc<dyn AuditRepository>) -> Self {
        Self { audit_repo }
    }
}

#[async_trait]
impl JobHandler for AuditConsumer {
    fn topic(&self) -> &'static str {
        TOPIC_AUDIT
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let entry: AuditLogEntry = job.payload_as()?;
        self.audit_repo.append(&entry).await
    }
}

pub struct NotificationConsumer {
    notifier: Arc<dyn NotificationDispatcher>,
}

impl NotificationConsumer {
    pub fn new(integrations: &IntegrationManager) -> Self {
        Self {
            notifier: integrations.notifier.clone(),
        }
    }
}

#[async_trait]
impl JobHandler for NotificationConsumer {
    fn topic(&self) -> &'static str {
        TOPIC_NOTIFICATIONS
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let notification: NotificationJob = job.payload_as()?;
        self.notifier.dispatch(&notification).await
    }
}

/// Renders the invoice for an activation, then queues the WhatsApp message
/// that carries its URL.
pub struct InvoiceConsumer {
    invoices: Arc<dyn InvoiceGenerator>,
    gym_repo: Arc<dyn GymRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    side_channel: Arc<SideChannel>,
}

impl InvoiceConsumer {
    pub fn new(
        integrations: &IntegrationManager,
        gym_repo: Arc<dyn GymRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        side_channel: Arc<SideChannel>,
    ) -> Self {
        Self {
            invoices: integrations.invoices.clone(),
            gym_repo,
            subscription_repo,
            payment_repo,
            side_channel,
        }
    }

    async fn build_request(&self, job: &InvoiceJob) -> Result<InvoiceRequest> {
        let subscription = self
            .subscription_repo
            .find_by_id(job.subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", job.subscription_id)))?;
        let payment = self
            .payment_repo
            .find_by_id(job.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", job.payment_id)))?;
        let gym = self
            .gym_repo
            .find_gym(subscription.gym_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Gym {} not found", subscription.gym_id)))?;
        let plan = self
            .gym_repo
            .find_plan(subscription.plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", subscription.plan_id)))?;
        let plan_duration = plan.duration_label();

        Ok(InvoiceRequest {
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            access_code: subscription.access_code,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            payment_id: payment.id,
            provider_payment_id: payment.provider_payment_id,
            amount: payment.amount,
            currency: payment.currency,
            method: payment.method,
            paid_at: payment.created_at,
            gym_id: gym.id,
            gym_name: gym.name,
            plan_id: plan.id,
            plan_name: plan.name,
            plan_duration,
        })
    }
}

#[async_trait]
impl JobHandler for InvoiceConsumer {
    fn topic(&self) -> &'static str {
        TOPIC_INVOICES
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let invoice_job: InvoiceJob = job.payload_as()?;

        if !self.invoices.is_enabled() {
            tracing::info!(
                subscription_id = %invoice_job.subscription_id,
                "Invoice service disabled, skipping invoice"
            );
            return Ok(());
        }

        let request = self.build_request(&invoice_job).await?;
        let invoice_url = self.invoices.generate(&request).await?;

        self.side_channel
            .notify(NotificationJob::WhatsAppInvoice(InvoiceNotice {
                user_id: request.user_id,
                subscription_id: request.subscription_id,
                payment_id: request.payment_id,
                invoice_url,
            }))
            .await;

        Ok(())
    }
}

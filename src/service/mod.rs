pub mod consumers;
pub mod payment_processor;
pub mod settlement_service;
pub mod side_channel;
pub mod subscription_service;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::integrations::IntegrationManager;
use crate::payments::{PaymentGateway, WebhookReceiver};
use crate::queue::{JobHandler, JobQueue, RetryPolicy, SqliteJobQueue};
use crate::repository::*;
use consumers::{AuditConsumer, InvoiceConsumer, NotificationConsumer};
use payment_processor::PaymentProcessor;
use settlement_service::SettlementService;
use side_channel::SideChannel;
use subscription_service::SubscriptionService;

pub use payment_processor::ProcessOutcome;
pub use settlement_service::SettlementDetail;
pub use subscription_service::SubscriptionCheckout;

/// Knobs the services take from configuration.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub webhook_secret: Option<String>,
    pub retry_policy: RetryPolicy,
}

pub struct ServiceContext {
    pub gym_repo: Arc<dyn GymRepository>,
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub settlement_repo: Arc<dyn SettlementRepository>,
    pub audit_repo: Arc<dyn AuditRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub integration_manager: Arc<IntegrationManager>,
    pub side_channel: Arc<SideChannel>,
    pub webhook_receiver: Arc<WebhookReceiver>,
    pub subscription_service: Arc<SubscriptionService>,
    pub settlement_service: Arc<SettlementService>,
    pub payment_processor: Arc<PaymentProcessor>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        integration_manager: Arc<IntegrationManager>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        options: ServiceOptions,
    ) -> Self {
        // Create repositories
        let gym_repo: Arc<dyn GymRepository> = Arc::new(SqliteGymRepository::new(db_pool.clone()));
        let subscription_repo: Arc<dyn SubscriptionRepository> =
            Arc::new(SqliteSubscriptionRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let settlement_repo: Arc<dyn SettlementRepository> =
            Arc::new(SqliteSettlementRepository::new(db_pool.clone()));
        let audit_repo: Arc<dyn AuditRepository> = Arc::new(SqliteAuditRepository::new(db_pool.clone()));
        let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::new(db_pool.clone()));

        let side_channel = Arc::new(SideChannel::new(queue.clone(), options.retry_policy));

        // Create services
        let webhook_receiver = Arc::new(WebhookReceiver::new(
            options.webhook_secret,
            queue.clone(),
            options.retry_policy,
        ));
        let subscription_service = Arc::new(SubscriptionService::new(
            gym_repo.clone(),
            subscription_repo.clone(),
            gateway,
            side_channel.clone(),
        ));
        let settlement_service = Arc::new(SettlementService::new(
            gym_repo.clone(),
            settlement_repo.clone(),
            payment_repo.clone(),
            side_channel.clone(),
        ));
        let payment_processor = Arc::new(PaymentProcessor::new(
            gym_repo.clone(),
            subscription_repo.clone(),
            payment_repo.clone(),
            side_channel.clone(),
        ));

        Self {
            gym_repo,
            subscription_repo,
            payment_repo,
            settlement_repo,
            audit_repo,
            queue,
            integration_manager,
            side_channel,
            webhook_receiver,
            subscription_service,
            settlement_service,
            payment_processor,
            db_pool,
        }
    }

    /// One consumer per queue topic.
    pub fn job_handlers(&self) -> Vec<Arc<dyn JobHandler>> {
        let payment_processor: Arc<dyn JobHandler> = self.payment_processor.clone();
        vec![
            payment_processor,
            Arc::new(AuditConsumer::new(self.audit_repo.clone())),
            Arc::new(NotificationConsumer::new(&self.integration_manager)),
            Arc::new(InvoiceConsumer::new(
                &self.integration_manager,
                self.gym_repo.clone(),
                self.subscription_repo.clone(),
                self.payment_repo.clone(),
                self.side_channel.clone(),
            )),
        ]
    }
}

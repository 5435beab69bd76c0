#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gymsettle::{
    domain::{CreateGymRequest, CreatePlanRequest, DurationUnit, Gym, InvoiceRequest, NotificationJob, Plan},
    error::{AppError, Result},
    integrations::{Integration, IntegrationManager, InvoiceGenerator, NotificationDispatcher},
    payments::{compute_signature, OrderRequest, PaymentGateway, ProviderOrder},
    queue::{RetryPolicy, Worker, WorkerConfig},
    service::{ServiceContext, ServiceOptions},
};
use serde_json::json;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// One long-lived connection: every handle sees the same in-memory database.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Database file with several connections, for tests where callers must
/// really overlap.
pub async fn file_pool(path: &std::path::Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(10));
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[derive(Default)]
pub struct FakeGateway {
    pub orders: Mutex<Vec<OrderRequest>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: OrderRequest) -> Result<ProviderOrder> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(request.clone());
        Ok(ProviderOrder {
            id: format!("order_test_{}", orders.len()),
            amount: request.amount,
            currency: request.currency,
            status: "created".to_string(),
        })
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<NotificationJob>>,
    pub fail: bool,
}

#[async_trait]
impl Integration for RecordingDispatcher {
    fn name(&self) -> &str {
        "Recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &NotificationJob) -> Result<()> {
        if self.fail {
            return Err(AppError::External("dispatcher down".to_string()));
        }
        self.sent.lock().unwrap().push(job.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticInvoices {
    pub requests: Mutex<Vec<InvoiceRequest>>,
}

#[async_trait]
impl Integration for StaticInvoices {
    fn name(&self) -> &str {
        "StaticInvoices"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl InvoiceGenerator for StaticInvoices {
    async fn generate(&self, request: &InvoiceRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(format!("https://invoices.test/{}.pdf", request.payment_id))
    }
}

pub struct TestApp {
    pub pool: SqlitePool,
    pub ctx: Arc<ServiceContext>,
    pub gateway: Arc<FakeGateway>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub invoices: Arc<StaticInvoices>,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_secret(Some(WEBHOOK_SECRET.to_string())).await
    }

    pub async fn with_secret(webhook_secret: Option<String>) -> anyhow::Result<Self> {
        Ok(Self::with_pool(test_pool().await?, webhook_secret))
    }

    pub fn with_pool(pool: SqlitePool, webhook_secret: Option<String>) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let invoices = Arc::new(StaticInvoices::default());

        let integrations = Arc::new(IntegrationManager::new(dispatcher.clone(), invoices.clone()));
        let ctx = Arc::new(ServiceContext::new(
            pool.clone(),
            integrations,
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
            ServiceOptions {
                webhook_secret,
                // No backoff so retries are due immediately
                retry_policy: RetryPolicy::new(3, 0),
            },
        ));

        Self {
            pool,
            ctx,
            gateway,
            dispatcher,
            invoices,
        }
    }

    pub async fn gym_with_plan(&self, price: i64) -> anyhow::Result<(Gym, Plan)> {
        self.owned_gym_with_plan(Uuid::new_v4(), price).await
    }

    pub async fn owned_gym_with_plan(&self, owner_id: Uuid, price: i64) -> anyhow::Result<(Gym, Plan)> {
        let gym = self
            .ctx
            .gym_repo
            .create_gym(CreateGymRequest {
                owner_id,
                name: "Iron Temple".to_string(),
            })
            .await?;
        let plan = self
            .ctx
            .gym_repo
            .create_plan(CreatePlanRequest {
                gym_id: gym.id,
                name: "Monthly".to_string(),
                price,
                currency: "INR".to_string(),
                duration_value: 1,
                duration_unit: DurationUnit::Month,
            })
            .await?;
        Ok((gym, plan))
    }

    /// Run every due job on every topic until the queue is idle.
    pub async fn drain_all(&self) -> anyhow::Result<()> {
        loop {
            let mut ran = 0;
            for handler in self.ctx.job_handlers() {
                let worker = Worker::new(self.ctx.queue.clone(), handler, WorkerConfig::default());
                ran += worker.drain().await?.len();
            }
            if ran == 0 {
                return Ok(());
            }
        }
    }

    pub async fn count_jobs(&self, topic: &str) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE topic = ?")
            .bind(topic)
            .fetch_one(&self.pool)
            .await?)
    }
}

pub fn captured_body(subscription_id: Option<Uuid>, order_id: &str, payment_id: &str, amount: i64) -> Vec<u8> {
    let notes = match subscription_id {
        Some(id) => json!({ "subscription_id": id.to_string() }),
        None => json!([]),
    };
    serde_json::to_vec(&json!({
        "entity": "event",
        "account_id": "acc_test",
        "event": "payment.captured",
        "contains": ["payment"],
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "entity": "payment",
                    "amount": amount,
                    "currency": "INR",
                    "status": "captured",
                    "order_id": order_id,
                    "method": "upi",
                    "notes": notes
                }
            }
        },
        "created_at": 1_700_000_000
    }))
    .unwrap()
}

pub fn sign(body: &[u8]) -> String {
    compute_signature(body, WEBHOOK_SECRET)
}

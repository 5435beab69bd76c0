use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Activation, Payment, PaymentStatus, SettlementStatus},
    error::{AppError, Result},
    repository::{
        is_unique_violation, parse_uuid, to_utc,
        subscription_repository::{activate_pending, fetch_subscription},
        CaptureRecord, PaymentRepository,
    },
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    provider_order_id: String,
    provider_payment_id: String,
    amount: i64,
    currency: String,
    status: String,
    method: String,
    settlement_status: String,
    settlement_id: Option<String>,
    subscription_id: String,
    gym_id: String,
    user_id: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const PAYMENT_COLUMNS: &str = "id, provider_order_id, provider_payment_id, amount, currency, \
     status, method, settlement_status, settlement_id, subscription_id, gym_id, user_id, \
     created_at, updated_at";

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            provider_order_id: row.provider_order_id,
            provider_payment_id: row.provider_payment_id,
            amount: row.amount,
            currency: row.currency,
            status: PaymentStatus::from_str(&row.status).ok_or_else(|| {
                AppError::PermanentProcessing(format!("Invalid payment status: {}", row.status))
            })?,
            method: row.method,
            settlement_status: SettlementStatus::from_str(&row.settlement_status).ok_or_else(|| {
                AppError::PermanentProcessing(format!(
                    "Invalid settlement status: {}",
                    row.settlement_status
                ))
            })?,
            settlement_id: row.settlement_id.as_deref().map(parse_uuid).transpose()?,
            subscription_id: parse_uuid(&row.subscription_id)?,
            gym_id: parse_uuid(&row.gym_id)?,
            user_id: parse_uuid(&row.user_id)?,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_provider_ids(&self, order_id: &str, payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE provider_order_id = ? AND provider_payment_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_by_settlement(&self, settlement_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE settlement_id = ? ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        ))
        .bind(settlement_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn list_by_gym(&self, gym_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE gym_id = ? ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        ))
        .bind(gym_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn record_capture(&self, payment: Payment, activation: Option<Activation>) -> Result<CaptureRecord> {
        let mut tx = self.pool.begin().await?;

        // Insert first: the unique (order, payment) index is the idempotency
        // guard for deliveries racing past the pre-check.
        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (
                id, provider_order_id, provider_payment_id, amount, currency,
                status, method, settlement_status, settlement_id,
                subscription_id, gym_id, user_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?)
            "#
        )
        .bind(payment.id.to_string())
        .bind(&payment.provider_order_id)
        .bind(&payment.provider_payment_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.method)
        .bind(payment.settlement_status.as_str())
        .bind(payment.subscription_id.to_string())
        .bind(payment.gym_id.to_string())
        .bind(payment.user_id.to_string())
        .bind(payment.created_at.naive_utc())
        .bind(payment.updated_at.naive_utc())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(CaptureRecord::Duplicate),
            Err(e) => return Err(e.into()),
        }

        let mut activated = None;
        if let Some(activation) = activation {
            if activate_pending(&mut tx, &activation).await? {
                activated = fetch_subscription(&mut tx, activation.subscription_id).await?;
            }
        }

        tx.commit().await?;

        Ok(CaptureRecord::Recorded { payment, activated })
    }
}

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{generate_access_code, Activation, Subscription, SubscriptionStatus},
    error::{AppError, Result},
    repository::{is_unique_violation, parse_uuid, placeholders, to_utc, SubscriptionRepository},
};

#[derive(FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    gym_id: String,
    plan_id: String,
    status: String,
    start_date: Option<NaiveDateTime>,
    end_date: Option<NaiveDateTime>,
    access_code: Option<String>,
    payment_id: Option<String>,
    provider_order_id: Option<String>,
    order_amount: i64,
    currency: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, gym_id, plan_id, status, start_date, end_date, \
     access_code, payment_id, provider_order_id, order_amount, currency, created_at, updated_at";

pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_subscription(row: SubscriptionRow) -> Result<Subscription> {
    Ok(Subscription {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        gym_id: parse_uuid(&row.gym_id)?,
        plan_id: parse_uuid(&row.plan_id)?,
        status: SubscriptionStatus::from_str(&row.status).ok_or_else(|| {
            AppError::PermanentProcessing(format!("Invalid subscription status: {}", row.status))
        })?,
        start_date: row.start_date.map(to_utc),
        end_date: row.end_date.map(to_utc),
        access_code: row.access_code,
        payment_id: row.payment_id.as_deref().map(parse_uuid).transpose()?,
        provider_order_id: row.provider_order_id,
        order_amount: row.order_amount,
        currency: row.currency,
        created_at: to_utc(row.created_at),
        updated_at: to_utc(row.updated_at),
    })
}

pub(crate) async fn fetch_subscription(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Subscription>> {
    let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {} FROM subscriptions WHERE id = ?",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(row_to_subscription).transpose()
}

const ACCESS_CODE_ATTEMPTS: usize = 5;

/// Which unique index an activation ran into.
#[derive(Debug, PartialEq, Eq)]
enum ActivationClash {
    AccessCode,
    ActiveSubscription,
}

fn activation_clash(err: &sqlx::Error) -> Option<ActivationClash> {
    if !is_unique_violation(err) {
        return None;
    }
    let sqlx::Error::Database(db) = err else {
        return None;
    };
    let message = db.message();
    if message.contains("subscriptions.access_code") {
        Some(ActivationClash::AccessCode)
    } else if message.contains("subscriptions.user_id") {
        Some(ActivationClash::ActiveSubscription)
    } else {
        None
    }
}

/// pending -> active on an open connection or transaction. Returns false when
/// the row was not pending. A freshly drawn access code that is already taken
/// is redrawn.
pub(crate) async fn activate_pending(conn: &mut SqliteConnection, activation: &Activation) -> Result<bool> {
    let mut access_code = activation.access_code.clone();

    for _ in 0..ACCESS_CODE_ATTEMPTS {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'active',
                start_date = ?,
                end_date = ?,
                access_code = COALESCE(access_code, ?),
                payment_id = COALESCE(?, payment_id),
                updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#
        )
        .bind(activation.start_date.naive_utc())
        .bind(activation.end_date.naive_utc())
        .bind(&access_code)
        .bind(activation.payment_id.map(|id| id.to_string()))
        .bind(Utc::now().naive_utc())
        .bind(activation.subscription_id.to_string())
        .execute(&mut *conn)
        .await;

        match result {
            Ok(result) => return Ok(result.rows_affected() > 0),
            Err(e) => match activation_clash(&e) {
                Some(ActivationClash::AccessCode) => {
                    tracing::warn!(
                        subscription_id = %activation.subscription_id,
                        "Access code already taken, drawing another"
                    );
                    access_code = generate_access_code();
                }
                Some(ActivationClash::ActiveSubscription) => {
                    return Err(AppError::Conflict(
                        "User already has an active subscription at this gym".to_string(),
                    ));
                }
                None => return Err(e.into()),
            },
        }
    }

    Err(AppError::TransientInfra(format!(
        "No free access code for subscription {} after {} attempts",
        activation.subscription_id, ACCESS_CODE_ATTEMPTS
    )))
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn create(&self, subscription: Subscription) -> Result<Subscription> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, gym_id, plan_id, status, start_date, end_date,
                access_code, payment_id, provider_order_id, order_amount, currency,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(subscription.id.to_string())
        .bind(subscription.user_id.to_string())
        .bind(subscription.gym_id.to_string())
        .bind(subscription.plan_id.to_string())
        .bind(subscription.status.as_str())
        .bind(subscription.start_date.map(|dt| dt.naive_utc()))
        .bind(subscription.end_date.map(|dt| dt.naive_utc()))
        .bind(&subscription.access_code)
        .bind(subscription.payment_id.map(|id| id.to_string()))
        .bind(&subscription.provider_order_id)
        .bind(subscription.order_amount)
        .bind(&subscription.currency)
        .bind(subscription.created_at.naive_utc())
        .bind(subscription.updated_at.naive_utc())
        .execute(&self.pool)
        .await?;

        self.find_by_id(subscription.id).await?.ok_or_else(|| {
            AppError::TransientInfra("Failed to retrieve created subscription".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>> {
        let mut conn = self.pool.acquire().await?;
        fetch_subscription(&mut conn, id).await
    }

    async fn find_by_provider_order_id(&self, order_id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE provider_order_id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_subscription).transpose()
    }

    async fn find_active(&self, user_id: Uuid, gym_id: Uuid) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = ? AND gym_id = ? AND status = 'active'",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(gym_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_subscription).transpose()
    }

    async fn activate(&self, activation: &Activation) -> Result<Option<Subscription>> {
        let mut conn = self.pool.acquire().await?;

        if !activate_pending(&mut conn, activation).await? {
            return Ok(None);
        }

        fetch_subscription(&mut conn, activation.subscription_id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
    ) -> Result<Option<Subscription>> {
        if from.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "UPDATE subscriptions SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(Utc::now().naive_utc())
            .bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let mut conn = self.pool.acquire().await?;
        let result = query.execute(&mut *conn).await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        fetch_subscription(&mut conn, id).await
    }
}

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{GymUnsettledTotal, Settlement, SettlementFilter, SettlementState, UnsettledAmount},
    error::{AppError, Result},
    repository::{parse_uuid, placeholders, to_utc, SettlementRepository},
};

#[derive(FromRow)]
struct SettlementRow {
    id: String,
    gym_id: String,
    amount: i64,
    payment_count: i64,
    status: String,
    transaction_id: Option<String>,
    notes: Option<String>,
    created_at: NaiveDateTime,
    processed_at: Option<NaiveDateTime>,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct UnsettledRow {
    gym_id: String,
    gym_name: String,
    amount: i64,
    count: i64,
}

const SETTLEMENT_COLUMNS: &str = "id, gym_id, amount, payment_count, status, transaction_id, \
     notes, created_at, processed_at, updated_at";

const MAX_PAGE_SIZE: i64 = 200;

pub struct SqliteSettlementRepository {
    pool: SqlitePool,
}

impl SqliteSettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_settlement(row: SettlementRow) -> Result<Settlement> {
        Ok(Settlement {
            id: parse_uuid(&row.id)?,
            gym_id: parse_uuid(&row.gym_id)?,
            amount: row.amount,
            payment_count: row.payment_count,
            status: SettlementState::from_str(&row.status).ok_or_else(|| {
                AppError::PermanentProcessing(format!("Invalid settlement status: {}", row.status))
            })?,
            transaction_id: row.transaction_id,
            notes: row.notes,
            created_at: to_utc(row.created_at),
            processed_at: row.processed_at.map(to_utc),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn fetch(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Settlement>> {
        let row = sqlx::query_as::<_, SettlementRow>(&format!(
            "SELECT {} FROM settlements WHERE id = ?",
            SETTLEMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Self::row_to_settlement).transpose()
    }
}

#[async_trait]
impl SettlementRepository for SqliteSettlementRepository {
    async fn create_for_gym(&self, gym_id: Uuid) -> Result<Option<Settlement>> {
        let settlement_id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        let mut tx = self.pool.begin().await?;

        // Claim with one conditional UPDATE. Rows already claimed by another
        // settlement no longer match, so member sets are disjoint even if two
        // callers get here at once.
        let claimed = sqlx::query(
            r#"
            UPDATE payments
            SET settlement_status = 'settled', settlement_id = ?, updated_at = ?
            WHERE gym_id = ? AND status = 'captured' AND settlement_status = 'unsettled'
            "#
        )
        .bind(settlement_id.to_string())
        .bind(now)
        .bind(gym_id.to_string())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let (amount, count): (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM payments WHERE settlement_id = ?"
        )
        .bind(settlement_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO settlements (
                id, gym_id, amount, payment_count, status,
                transaction_id, notes, created_at, processed_at, updated_at
            ) VALUES (?, ?, ?, ?, 'pending', NULL, NULL, ?, NULL, ?)
            "#
        )
        .bind(settlement_id.to_string())
        .bind(gym_id.to_string())
        .bind(amount)
        .bind(count)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let settlement = Self::fetch(&mut tx, settlement_id).await?.ok_or_else(|| {
            AppError::TransientInfra("Failed to retrieve created settlement".to_string())
        })?;

        tx.commit().await?;

        Ok(Some(settlement))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Settlement>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    async fn list(&self, filter: &SettlementFilter) -> Result<Vec<Settlement>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM settlements WHERE 1 = 1",
            SETTLEMENT_COLUMNS
        ));

        if let Some(gym_id) = filter.gym_id {
            builder.push(" AND gym_id = ").push_bind(gym_id.to_string());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.from {
            builder.push(" AND created_at >= ").push_bind(from.naive_utc());
        }
        if let Some(to) = filter.to {
            builder.push(" AND created_at <= ").push_bind(to.naive_utc());
        }

        let limit = filter.limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0).max(0);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder
            .build_query_as::<SettlementRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_settlement).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[SettlementState],
        to: SettlementState,
        transaction_id: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Option<Settlement>> {
        if from.is_empty() {
            return Ok(None);
        }

        let now = Utc::now().naive_utc();
        let processed_at = (to == SettlementState::Processed).then_some(now);

        let sql = format!(
            r#"
            UPDATE settlements
            SET status = ?,
                transaction_id = COALESCE(?, transaction_id),
                notes = COALESCE(?, notes),
                processed_at = COALESCE(?, processed_at),
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders(from.len())
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(transaction_id)
            .bind(notes)
            .bind(processed_at)
            .bind(now)
            .bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let mut conn = self.pool.acquire().await?;
        let result = query.execute(&mut *conn).await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Self::fetch(&mut conn, id).await
    }

    async fn unsettled_amount(&self, gym_id: Uuid) -> Result<UnsettledAmount> {
        // One statement reads one snapshot: either before or after a
        // concurrent settlement commits
        let (amount, count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0), COUNT(*)
            FROM payments
            WHERE gym_id = ? AND status = 'captured' AND settlement_status = 'unsettled'
            "#
        )
        .bind(gym_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(UnsettledAmount { gym_id, amount, count })
    }

    async fn unsettled_summary(&self) -> Result<Vec<GymUnsettledTotal>> {
        let rows = sqlx::query_as::<_, UnsettledRow>(
            r#"
            SELECT p.gym_id AS gym_id,
                   g.name AS gym_name,
                   SUM(p.amount) AS amount,
                   COUNT(*) AS count
            FROM payments p
            JOIN gyms g ON g.id = p.gym_id
            WHERE p.status = 'captured' AND p.settlement_status = 'unsettled'
            GROUP BY p.gym_id, g.name
            ORDER BY amount DESC
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(GymUnsettledTotal {
                    gym_id: parse_uuid(&row.gym_id)?,
                    gym_name: row.gym_name,
                    amount: row.amount,
                    count: row.count,
                })
            })
            .collect()
    }
}

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::{
    domain::{AuditLogEntry, AuditQuery},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, AuditRepository},
};

#[derive(FromRow)]
struct AuditRow {
    id: String,
    actor_id: Option<String>,
    entity: String,
    entity_id: String,
    action: String,
    details: String,
    created_at: NaiveDateTime,
}

pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: AuditRow) -> Result<AuditLogEntry> {
        Ok(AuditLogEntry {
            id: parse_uuid(&row.id)?,
            actor_id: row.actor_id.as_deref().map(parse_uuid).transpose()?,
            entity: row.entity,
            entity_id: row.entity_id,
            action: row.action,
            details: serde_json::from_str(&row.details)
                .map_err(|e| AppError::PermanentProcessing(format!("Corrupt audit details: {}", e)))?,
            created_at: to_utc(row.created_at),
        })
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        // INSERT OR IGNORE: a redelivered audit job carries the same id
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO audit_log (id, actor_id, entity, entity_id, action, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(entry.id.to_string())
        .bind(entry.actor_id.map(|id| id.to_string()))
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.action)
        .bind(entry.details.to_string())
        .bind(entry.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, actor_id, entity, entity_id, action, details, created_at FROM audit_log WHERE 1 = 1",
        );

        if let Some(entity) = &query.entity {
            builder.push(" AND entity = ").push_bind(entity.clone());
        }
        if let Some(entity_id) = &query.entity_id {
            builder.push(" AND entity_id = ").push_bind(entity_id.clone());
        }

        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(query.limit.unwrap_or(100).clamp(1, 500));

        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}

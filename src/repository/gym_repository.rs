use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreateGymRequest, CreatePlanRequest, DurationUnit, Gym, Plan},
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, GymRepository},
};

#[derive(FromRow)]
struct GymRow {
    id: String,
    owner_id: String,
    name: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct PlanRow {
    id: String,
    gym_id: String,
    name: String,
    price: i64,
    currency: String,
    duration_value: i64,
    duration_unit: String,
    is_active: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteGymRepository {
    pool: SqlitePool,
}

impl SqliteGymRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_gym(row: GymRow) -> Result<Gym> {
        Ok(Gym {
            id: parse_uuid(&row.id)?,
            owner_id: parse_uuid(&row.owner_id)?,
            name: row.name,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    fn row_to_plan(row: PlanRow) -> Result<Plan> {
        Ok(Plan {
            id: parse_uuid(&row.id)?,
            gym_id: parse_uuid(&row.gym_id)?,
            name: row.name,
            price: row.price,
            currency: row.currency,
            duration_value: u32::try_from(row.duration_value).map_err(|_| {
                AppError::PermanentProcessing(format!("Invalid plan duration: {}", row.duration_value))
            })?,
            duration_unit: DurationUnit::from_str(&row.duration_unit).ok_or_else(|| {
                AppError::PermanentProcessing(format!("Invalid duration unit: {}", row.duration_unit))
            })?,
            is_active: row.is_active != 0,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

#[async_trait]
impl GymRepository for SqliteGymRepository {
    async fn create_gym(&self, request: CreateGymRequest) -> Result<Gym> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO gyms (id, owner_id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.owner_id.to_string())
        .bind(&request.name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_gym(id).await?.ok_or_else(|| {
            AppError::TransientInfra("Failed to retrieve created gym".to_string())
        })
    }

    async fn find_gym(&self, id: Uuid) -> Result<Option<Gym>> {
        let row = sqlx::query_as::<_, GymRow>(
            "SELECT id, owner_id, name, created_at, updated_at FROM gyms WHERE id = ?"
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_gym(r)?)),
            None => Ok(None),
        }
    }

    async fn create_plan(&self, request: CreatePlanRequest) -> Result<Plan> {
        if request.price < 0 {
            return Err(AppError::Validation("Plan price cannot be negative".to_string()));
        }
        if request.duration_value == 0 {
            return Err(AppError::Validation("Plan duration must be positive".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO plans (
                id, gym_id, name, price, currency,
                duration_value, duration_unit, is_active,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.gym_id.to_string())
        .bind(&request.name)
        .bind(request.price)
        .bind(&request.currency)
        .bind(request.duration_value as i64)
        .bind(request.duration_unit.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_plan(id).await?.ok_or_else(|| {
            AppError::TransientInfra("Failed to retrieve created plan".to_string())
        })
    }

    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, gym_id, name, price, currency,
                   duration_value, duration_unit, is_active,
                   created_at, updated_at
            FROM plans
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_plan(r)?)),
            None => Ok(None),
        }
    }
}

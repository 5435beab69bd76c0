use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    auth::Principal,
    domain::{AuditLogEntry, AuditQuery},
    error::Result,
    queue::Job,
};

#[derive(Debug, Deserialize)]
pub struct FailedJobsParams {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    let entries = state.service_context.audit_repo.list(&query).await?;
    Ok(Json(entries))
}

pub async fn failed_jobs(
    State(state): State<AppState>,
    Query(params): Query<FailedJobsParams>,
) -> Result<Json<Vec<Job>>> {
    let jobs = state
        .service_context
        .queue
        .list_failed(params.limit.clamp(1, 500))
        .await?;
    Ok(Json(jobs))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>> {
    let job = state.service_context.queue.requeue(id).await?;
    tracing::info!(job_id = %id, topic = %job.topic, "Parked job requeued by admin");

    state
        .service_context
        .side_channel
        .audit(AuditLogEntry::new(
            Some(principal.actor_id),
            "job",
            id,
            "JOB_REQUEUED",
            json!({ "topic": job.topic }),
        ))
        .await;

    Ok(Json(job))
}

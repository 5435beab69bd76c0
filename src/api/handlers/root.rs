use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "gymsettle",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Payment webhook ingestion and settlement for gym memberships",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "webhooks": "/webhooks/razorpay",
            "subscriptions": "/api/subscriptions",
            "settlements": "/api/settlements",
            "admin": "/admin"
        }
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.service_context.db_pool)
        .await
        .is_ok();

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(json!({
        "status": if database { "healthy" } else { "degraded" },
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

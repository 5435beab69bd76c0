use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    api::{handlers::authorize_gym, state::AppState},
    auth::{Capability, Principal},
    domain::{
        CreateSettlementRequest, FailSettlementRequest, GymUnsettledTotal, ProcessSettlementRequest,
        Settlement, SettlementFilter, SettlementOutcome, UnsettledAmount,
    },
    error::{AppError, Result},
    service::SettlementDetail,
};

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateSettlementRequest>,
) -> Result<Response> {
    principal.require(Capability::ManageSettlements)?;

    let outcome = state
        .service_context
        .settlement_service
        .create_settlement(request.gym_id, Some(principal.actor_id))
        .await?;

    let response = match outcome {
        SettlementOutcome::Created(settlement) => (
            StatusCode::CREATED,
            Json(json!({ "settled": true, "settlement": settlement })),
        ),
        SettlementOutcome::NothingToSettle { gym_id } => (
            StatusCode::OK,
            Json(json!({
                "settled": false,
                "gym_id": gym_id,
                "message": "No unsettled payments for this gym",
            })),
        ),
    };

    Ok(response.into_response())
}

pub async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<SettlementFilter>,
) -> Result<Json<Vec<Settlement>>> {
    principal.require(Capability::ViewSettlements)?;
    if !principal.is_admin() {
        // Owners list one of their own gyms at a time
        let gym_id = filter.gym_id.ok_or(AppError::Forbidden)?;
        authorize_gym(&state, &principal, Capability::ViewSettlements, gym_id).await?;
    }

    let settlements = state
        .service_context
        .settlement_service
        .list_settlements(&filter)
        .await?;

    Ok(Json(settlements))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementDetail>> {
    principal.require(Capability::ViewSettlements)?;

    let detail = state
        .service_context
        .settlement_service
        .get_settlement_detail(id)
        .await?;
    authorize_gym(&state, &principal, Capability::ViewSettlements, detail.settlement.gym_id).await?;

    Ok(Json(detail))
}

pub async fn process(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProcessSettlementRequest>,
) -> Result<Json<Settlement>> {
    principal.require(Capability::ManageSettlements)?;

    let settlement = state
        .service_context
        .settlement_service
        .process_settlement(id, request, Some(principal.actor_id))
        .await?;

    Ok(Json(settlement))
}

pub async fn fail(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(request): Json<FailSettlementRequest>,
) -> Result<Json<Settlement>> {
    principal.require(Capability::ManageSettlements)?;

    let settlement = state
        .service_context
        .settlement_service
        .fail_settlement(id, request, Some(principal.actor_id))
        .await?;

    Ok(Json(settlement))
}

pub async fn unsettled_summary(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<GymUnsettledTotal>>> {
    principal.require(Capability::ManageSettlements)?;

    let summary = state
        .service_context
        .settlement_service
        .get_unsettled_summary()
        .await?;

    Ok(Json(summary))
}

pub async fn unsettled_for_gym(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(gym_id): Path<Uuid>,
) -> Result<Json<UnsettledAmount>> {
    authorize_gym(&state, &principal, Capability::ViewSettlements, gym_id).await?;

    let amount = state
        .service_context
        .settlement_service
        .get_unsettled_amount(gym_id)
        .await?;

    Ok(Json(amount))
}

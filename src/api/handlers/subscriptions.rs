use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{handlers::authorize_gym, state::AppState},
    auth::{Capability, Principal},
    domain::{CancelSubscriptionRequest, CreateSubscriptionRequest, Subscription},
    error::Result,
    service::SubscriptionCheckout,
};

/// Members may act on their own subscriptions. Anyone else needs
/// `ManageSubscriptions` for the gym the subscription belongs to.
async fn ensure_self_or_gym_staff(
    state: &AppState,
    principal: &Principal,
    user_id: Uuid,
    gym_id: Uuid,
) -> Result<()> {
    if principal.actor_id == user_id {
        return Ok(());
    }
    authorize_gym(state, principal, Capability::ManageSubscriptions, gym_id).await?;
    Ok(())
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionCheckout>)> {
    principal.require(Capability::RequestSubscription)?;
    ensure_self_or_gym_staff(&state, &principal, request.user_id, request.gym_id).await?;

    let checkout = state
        .service_context
        .subscription_service
        .request_subscription(request, Some(principal.actor_id))
        .await?;

    Ok((StatusCode::CREATED, Json(checkout)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscription>> {
    let subscription = state.service_context.subscription_service.get(id).await?;
    ensure_self_or_gym_staff(&state, &principal, subscription.user_id, subscription.gym_id).await?;

    Ok(Json(subscription))
}

pub async fn activate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscription>> {
    principal.require(Capability::ManageSubscriptions)?;

    let service = &state.service_context.subscription_service;
    let existing = service.get(id).await?;
    authorize_gym(&state, &principal, Capability::ManageSubscriptions, existing.gym_id).await?;

    let subscription = service.activate_manually(id, principal.actor_id).await?;

    Ok(Json(subscription))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    request: Option<Json<CancelSubscriptionRequest>>,
) -> Result<Json<Subscription>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let service = &state.service_context.subscription_service;
    let existing = service.get(id).await?;
    ensure_self_or_gym_staff(&state, &principal, existing.user_id, existing.gym_id).await?;

    let subscription = service.cancel(id, principal.actor_id, request).await?;

    Ok(Json(subscription))
}

pub mod admin;
pub mod root;
pub mod settlements;
pub mod subscriptions;
pub mod webhooks;

use uuid::Uuid;

use crate::{
    api::state::AppState,
    auth::{Capability, Principal},
    domain::Gym,
    error::{AppError, Result},
};

/// Loads the gym and checks the caller holds `capability` for it.
pub(crate) async fn authorize_gym(
    state: &AppState,
    principal: &Principal,
    capability: Capability,
    gym_id: Uuid,
) -> Result<Gym> {
    principal.require(capability)?;

    let gym = state
        .service_context
        .gym_repo
        .find_gym(gym_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Gym {} not found", gym_id)))?;
    principal.require_gym(capability, &gym)?;

    Ok(gym)
}

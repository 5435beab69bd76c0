use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    api::state::AppState,
    auth::{Capability, Principal},
    error::AppError,
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Bearer token from `Authorization`, or the `X-Api-Key` header.
fn api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim());
        }
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, AppError> {
    let token = api_key(headers).filter(|t| !t.is_empty()).ok_or(AppError::Unauthorized)?;
    state.api_keys.authenticate(token).ok_or_else(|| {
        tracing::debug!("Rejected unknown API key");
        AppError::Unauthorized
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(&state, request.headers())?;

    // Insert the caller into request extensions
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

/// Admin surface: audit log and job management.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(&state, request.headers())?;
    principal.require(Capability::ViewAuditLog)?;
    principal.require(Capability::ManageJobs)?;

    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

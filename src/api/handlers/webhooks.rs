use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::{api::state::AppState, error::Result, payments::WebhookAck};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Verified events are queued and acknowledged before any processing, so
/// the provider never waits on business logic.
pub async fn razorpay(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = state
        .service_context
        .webhook_receiver
        .handle_webhook(&body, signature)
        .await?;

    Ok(Json(ack))
}

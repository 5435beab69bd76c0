pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    auth::ApiKeyStore,
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    api_keys: Arc<ApiKeyStore>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, api_keys, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        // Provider webhooks, authenticated by signature rather than API key
        .route("/webhooks/razorpay", post(handlers::webhooks::razorpay))

        // API routes
        .nest("/api", api_routes(app_state.clone()))

        // Admin routes
        .nest("/admin", admin_routes(app_state.clone()))

        // Add state to the router
        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/subscriptions", subscription_routes())
        .nest("/settlements", settlement_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}

fn subscription_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::subscriptions::create))
        .route("/:id", get(handlers::subscriptions::get))
        .route("/:id/activate", post(handlers::subscriptions::activate))
        .route("/:id/cancel", post(handlers::subscriptions::cancel))
}

fn settlement_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::settlements::list))
        .route("/", post(handlers::settlements::create))
        .route("/unsettled", get(handlers::settlements::unsettled_summary))
        .route("/unsettled/:gym_id", get(handlers::settlements::unsettled_for_gym))
        .route("/:id", get(handlers::settlements::get))
        .route("/:id/process", post(handlers::settlements::process))
        .route("/:id/fail", post(handlers::settlements::fail))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/audit-log", get(handlers::admin::audit_log))
        .route("/jobs/failed", get(handlers::admin::failed_jobs))
        .route("/jobs/:id/retry", post(handlers::admin::retry_job))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_admin,
        ))
}

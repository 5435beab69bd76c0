use std::sync::Arc;
use std::time::Duration as StdDuration;

use sqlx::sqlite::SqlitePoolOptions;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymsettle::{
    api,
    auth::ApiKeyStore,
    config::Settings,
    integrations::{invoice::HttpInvoiceGenerator, whatsapp::WhatsAppDispatcher, IntegrationManager},
    payments::{PaymentGateway, RazorpayClient},
    queue::{worker::run_maintenance, RetryPolicy, Worker, WorkerConfig},
    service::{ServiceContext, ServiceOptions},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymsettle=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting gymsettle on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Outbound collaborators
    let notify_timeout = StdDuration::from_secs(settings.notifications.timeout_seconds);
    let integration_manager = Arc::new(IntegrationManager::new(
        Arc::new(WhatsAppDispatcher::new(
            settings.notifications.whatsapp_dispatch_url.clone(),
            notify_timeout,
        )?),
        Arc::new(HttpInvoiceGenerator::new(
            settings.notifications.invoice_service_url.clone(),
            notify_timeout,
        )?),
    ));

    for (name, result) in integration_manager.health_check_all().await {
        match result {
            Ok(_) => tracing::info!("Integration {} is healthy", name),
            Err(e) => tracing::warn!("Integration {} health check failed: {:?}", name, e),
        }
    }

    // Initialize Razorpay order client if configured
    let razorpay = &settings.razorpay;
    let gateway: Option<Arc<dyn PaymentGateway>> = if razorpay.enabled {
        match (razorpay.key_id.clone(), razorpay.key_secret.clone()) {
            (Some(key_id), Some(key_secret)) => {
                tracing::info!("Razorpay order creation enabled");
                Some(Arc::new(RazorpayClient::new(
                    razorpay.api_base.clone(),
                    key_id,
                    key_secret,
                    StdDuration::from_secs(razorpay.timeout_seconds),
                )?))
            }
            _ => {
                tracing::warn!("Razorpay enabled but missing API keys");
                None
            }
        }
    } else {
        tracing::info!("Razorpay order creation disabled");
        None
    };

    if razorpay.webhook_secret.is_none() {
        tracing::warn!("Razorpay webhook secret not set; webhooks will be rejected");
    }

    let retry_policy = RetryPolicy::new(settings.queue.max_attempts, settings.queue.initial_backoff_ms);

    // Create service context
    let service_context = Arc::new(ServiceContext::new(
        db_pool.clone(),
        integration_manager,
        gateway,
        ServiceOptions {
            webhook_secret: razorpay.webhook_secret.clone(),
            retry_policy,
        },
    ));

    // Start one worker per topic, plus queue upkeep
    let shutdown = CancellationToken::new();
    let mut background = JoinSet::new();
    let worker_config = WorkerConfig {
        concurrency: settings.queue.concurrency,
        poll_interval: StdDuration::from_millis(settings.queue.poll_interval_ms),
    };

    for handler in service_context.job_handlers() {
        let worker = Worker::new(service_context.queue.clone(), handler, worker_config.clone());
        background.spawn(worker.run(shutdown.clone()));
    }

    background.spawn(run_maintenance(
        service_context.queue.clone(),
        chrono::Duration::hours(settings.queue.failed_retention_hours),
        chrono::Duration::seconds(settings.queue.lease_seconds),
        StdDuration::from_secs(60),
        shutdown.clone(),
    ));

    let api_keys = Arc::new(ApiKeyStore::from_config(&settings.auth.api_keys));
    if api_keys.is_empty() {
        tracing::warn!("No API keys configured; /api and /admin will reject every request");
    }

    // Create API app
    let app = api::create_app(service_context, api_keys, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    // Let workers finish the jobs they hold
    shutdown.cancel();
    while background.join_next().await.is_some() {}

    tracing::info!("Shutdown complete");

    Ok(())
}

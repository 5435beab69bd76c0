use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{InvoiceRequest, NotificationJob},
    error::{AppError, Result},
};

pub mod invoice;
pub mod whatsapp;

#[async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn health_check(&self) -> Result<()>;
}

/// Delivers member-facing notifications (access codes, invoices).
#[async_trait]
pub trait NotificationDispatcher: Integration {
    async fn dispatch(&self, job: &NotificationJob) -> Result<()>;
}

/// Renders an invoice document and answers with its URL.
#[async_trait]
pub trait InvoiceGenerator: Integration {
    async fn generate(&self, request: &InvoiceRequest) -> Result<String>;
}

/// Outbound collaborators, built once at startup and shared by the job
/// handlers that call them.
pub struct IntegrationManager {
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub invoices: Arc<dyn InvoiceGenerator>,
}

impl IntegrationManager {
    pub fn new(notifier: Arc<dyn NotificationDispatcher>, invoices: Arc<dyn InvoiceGenerator>) -> Self {
        Self { notifier, invoices }
    }

    pub async fn health_check_all(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::new();

        if let Some(result) = check(self.notifier.as_ref()).await {
            results.push(result);
        }
        if let Some(result) = check(self.invoices.as_ref()).await {
            results.push(result);
        }

        results
    }
}

async fn check<I: Integration + ?Sized>(integration: &I) -> Option<(String, Result<()>)> {
    if !integration.is_enabled() {
        tracing::info!("Integration {} is disabled", integration.name());
        return None;
    }
    Some((integration.name().to_string(), integration.health_check().await))
}

// Base implementation for common integration functionality
pub struct BaseIntegration {
    pub name: String,
    pub enabled: bool,
}

impl BaseIntegration {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
        }
    }
}

/// HTTP client for outbound collaborators. Every request, connect included,
/// gives up after `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Map a collaborator's HTTP status to an error. 5xx and 429 are worth
/// retrying; any other rejection will not change on retry.
pub(crate) fn classify_status(service: &str, status: reqwest::StatusCode, body: &str) -> AppError {
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AppError::External(format!("{} returned {}: {}", service, status, body))
    } else {
        AppError::PermanentProcessing(format!("{} rejected request ({}): {}", service, status, body))
    }
}

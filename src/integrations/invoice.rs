use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    domain::InvoiceRequest,
    error::{AppError, Result},
    integrations::{classify_status, http_client, BaseIntegration, Integration, InvoiceGenerator},
};

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    url: String,
}

/// Client for the external invoice renderer.
pub struct HttpInvoiceGenerator {
    base: BaseIntegration,
    client: reqwest::Client,
    service_url: Option<String>,
}

impl HttpInvoiceGenerator {
    pub fn new(service_url: Option<String>, timeout: Duration) -> Result<Self> {
        let service_url = service_url.filter(|url| !url.is_empty());
        Ok(Self {
            base: BaseIntegration::new("Invoices", service_url.is_some()),
            client: http_client(timeout)?,
            service_url,
        })
    }
}

#[async_trait]
impl Integration for HttpInvoiceGenerator {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn is_enabled(&self) -> bool {
        self.base.enabled
    }

    async fn health_check(&self) -> Result<()> {
        if self.service_url.is_none() {
            return Err(AppError::Config("Invoice service URL not configured".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InvoiceGenerator for HttpInvoiceGenerator {
    async fn generate(&self, request: &InvoiceRequest) -> Result<String> {
        let url = self
            .service_url
            .as_ref()
            .ok_or_else(|| AppError::Config("Invoice service URL not configured".to_string()))?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Invoice request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("Invoice service", status, &body));
        }

        let invoice: InvoiceResponse = response
            .json()
            .await
            .map_err(|e| AppError::External(format!("Unexpected invoice response: {}", e)))?;

        tracing::debug!(subscription_id = %request.subscription_id, "Invoice rendered");
        Ok(invoice.url)
    }
}

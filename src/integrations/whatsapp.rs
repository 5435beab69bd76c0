use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::NotificationJob,
    error::{AppError, Result},
    integrations::{classify_status, http_client, BaseIntegration, Integration, NotificationDispatcher},
};

/// Posts `{type, payload}` notification jobs to the WhatsApp dispatch
/// service. Without a URL it only logs what it would have sent.
pub struct WhatsAppDispatcher {
    base: BaseIntegration,
    client: reqwest::Client,
    dispatch_url: Option<String>,
}

impl WhatsAppDispatcher {
    pub fn new(dispatch_url: Option<String>, timeout: Duration) -> Result<Self> {
        let dispatch_url = dispatch_url.filter(|url| !url.is_empty());
        Ok(Self {
            base: BaseIntegration::new("WhatsApp", dispatch_url.is_some()),
            client: http_client(timeout)?,
            dispatch_url,
        })
    }
}

#[async_trait]
impl Integration for WhatsAppDispatcher {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn is_enabled(&self) -> bool {
        self.base.enabled
    }

    async fn health_check(&self) -> Result<()> {
        match &self.dispatch_url {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
            Some(url) => Err(AppError::Config(format!("Invalid WhatsApp dispatch URL: {}", url))),
            None => Err(AppError::Config("WhatsApp dispatch URL not configured".to_string())),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WhatsAppDispatcher {
    async fn dispatch(&self, job: &NotificationJob) -> Result<()> {
        let Some(url) = &self.dispatch_url else {
            tracing::info!(kind = job.kind(), "Would send WhatsApp notification: {:?}", job);
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(job)
            .send()
            .await
            .map_err(|e| AppError::External(format!("WhatsApp dispatch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("WhatsApp dispatcher", status, &body));
        }

        tracing::debug!(kind = job.kind(), "WhatsApp notification dispatched");
        Ok(())
    }
}

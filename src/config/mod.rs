use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

use crate::auth::Role;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub razorpay: RazorpayConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RazorpayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    /// Shared secret for webhook HMACs. Webhooks answer 500 while unset.
    pub webhook_secret: Option<String>,
    #[serde(default = "default_razorpay_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_http_timeout_seconds() -> u64 {
    10
}

fn default_razorpay_api_base() -> String {
    "https://api.razorpay.com".to_string()
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: None,
            key_secret: None,
            webhook_secret: None,
            api_base: default_razorpay_api_base(),
            enabled: false,
            timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub failed_retention_hours: i64,
    pub lease_seconds: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub whatsapp_dispatch_url: Option<String>,
    pub invoice_service_url: Option<String>,
    /// Applies to each call to the dispatcher and the invoice renderer.
    #[serde(default = "default_http_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            whatsapp_dispatch_url: None,
            invoice_service_url: None,
            timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

/// An API key is stored as the hex SHA-256 of the bearer token.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyConfig {
    pub key_sha256: String,
    pub actor_id: uuid::Uuid,
    pub roles: Vec<Role>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://gymsettle.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("razorpay.enabled", false)?
            .set_default("queue.concurrency", 5)?
            .set_default("queue.max_attempts", 3)?
            .set_default("queue.initial_backoff_ms", 1000)?
            .set_default("queue.poll_interval_ms", 500)?
            .set_default("queue.failed_retention_hours", 24)?
            .set_default("queue.lease_seconds", 300)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with GYMSETTLE__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("GYMSETTLE").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            initial_backoff_ms: 1000,
            poll_interval_ms: 500,
            failed_retention_hours: 24,
            lease_seconds: 300,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://gymsettle.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            razorpay: RazorpayConfig::default(),
            queue: QueueConfig::default(),
            notifications: NotificationConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

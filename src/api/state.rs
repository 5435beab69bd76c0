use std::sync::Arc;
use crate::{
    auth::ApiKeyStore,
    config::Settings,
    service::ServiceContext,
};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub api_keys: Arc<ApiKeyStore>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        service_context: Arc<ServiceContext>,
        api_keys: Arc<ApiKeyStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            service_context,
            api_keys,
            settings,
        }
    }
}

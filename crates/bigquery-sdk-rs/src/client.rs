use std::sync::Arc;

use crate::config::ClientConfig;
use crate::service::Service;

/// A cheaply cloneable handle on the service and the configuration every
/// resource needs. Each resource handle carries one.
#[derive(Debug, Clone)]
pub struct Client {
    service: Arc<dyn Service>,
    config: Arc<ClientConfig>,
}

impl Client {
    pub fn new(service: Arc<dyn Service>, config: ClientConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }

    #[inline]
    pub fn service(&self) -> &dyn Service {
        &*self.service
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[inline]
    pub fn project_id(&self) -> &str {
        self.service.project_id()
    }
}

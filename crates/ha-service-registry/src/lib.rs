//! Service registry with async handlers
//!
//! Services are addressed as `domain.service`. Integrations register a
//! handler per service; callers dispatch a [`ServiceCall`] by name and await
//! the handler's completion.

use dashmap::DashMap;
use ha_core::{Context, ServiceCall};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub type ServiceResult = Result<(), ServiceError>;

pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// Registered services keyed by `domain.service`
pub struct ServiceRegistry {
    services: DashMap<String, ServiceHandler>,
}

fn service_key(domain: &str, service: &str) -> String {
    format!("{}.{}", domain, service)
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register (or replace) the handler of `domain.service`
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        handler: F,
    ) where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();
        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(service_key(&domain, &service), handler);
    }

    /// Call a service and wait for its handler to finish
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let handler = self
            .services
            .get(&service_key(domain, service))
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!(domain = %domain, service = %service, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        debug!(domain = %domain, service = %service, "Calling service");
        // the map guard is released above, handlers may call back into the registry
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

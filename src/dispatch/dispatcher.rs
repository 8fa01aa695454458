//! The entry point for sending requests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;

use super::registry::HandlerRegistry;
use super::request::Request;
use crate::error::{CourierError, CourierResult};

/// Sends requests to their registered pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    pub fn from_shared(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Run `request` through its pipeline.
    ///
    /// # Errors
    ///
    /// - `Configuration` when no handler is registered for `R`
    /// - `Cancelled` when `cancel` fires before the handler completes
    /// - `Validation` when a validator rejects the request and `R::Response`
    ///   cannot carry the failure itself
    /// - whatever the handler or a behavior returns
    pub async fn send<R: Request>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> CourierResult<R::Response> {
        let Some(pipeline) = self.registry.pipeline::<R>() else {
            error!(request = R::request_name(), "No handler registered for request type");
            return Err(CourierError::handler_not_registered(R::request_name()));
        };

        if cancel.is_cancelled() {
            return Err(CourierError::Cancelled);
        }

        pipeline.execute(request, cancel).await
    }
}

//! Runs every validator registered for a request before the handler.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::dispatch::pipeline::{Next, PipelineBehavior};
use crate::dispatch::request::{Request, Response};
use crate::error::{CourierError, CourierResult};
use crate::validation::{group_failures, Validator};

/// Short-circuits with a `VALIDATION_ERROR` when any validator reports a
/// failure. Without validators it only delegates.
pub struct ValidationBehavior<R: Request> {
    validators: Vec<Arc<dyn Validator<R>>>,
}

impl<R: Request> ValidationBehavior<R> {
    pub fn new(validators: Vec<Arc<dyn Validator<R>>>) -> Self {
        Self { validators }
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }
}

#[async_trait]
impl<R: Request> PipelineBehavior<R> for ValidationBehavior<R> {
    async fn handle(
        &self,
        request: R,
        cancel: &CancellationToken,
        next: Next<'_, R>,
    ) -> CourierResult<R::Response> {
        if self.validators.is_empty() {
            return next.run(request, cancel).await;
        }

        let reports = join_all(
            self.validators
                .iter()
                .map(|validator| validator.validate(&request)),
        )
        .await;

        if cancel.is_cancelled() {
            return Err(CourierError::Cancelled);
        }

        let errors = group_failures(reports.into_iter().flatten());
        if errors.is_empty() {
            return next.run(request, cancel).await;
        }

        warn!(
            request = R::request_name(),
            failures = %errors,
            "Request failed validation"
        );
        R::Response::from_error(CourierError::Validation(errors))
    }
}

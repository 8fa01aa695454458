//! Pipeline behaviors and the continuation that links them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::request::{Request, RequestHandler};
use crate::error::{CourierError, CourierResult};

/// Cross-cutting step wrapped around a handler.
///
/// A behavior either returns without calling `next` (short-circuit) or
/// delegates with `next.run(request, cancel)`. Cancellation errors returned
/// by `next` must be passed through unchanged.
#[async_trait]
pub trait PipelineBehavior<R: Request>: Send + Sync + 'static {
    async fn handle(
        &self,
        request: R,
        cancel: &CancellationToken,
        next: Next<'_, R>,
    ) -> CourierResult<R::Response>;
}

/// The rest of the pipeline after the current behavior
pub struct Next<'a, R: Request> {
    behaviors: &'a [Arc<dyn PipelineBehavior<R>>],
    handler: &'a dyn RequestHandler<R>,
}

impl<'a, R: Request> Next<'a, R> {
    pub(crate) fn new(
        behaviors: &'a [Arc<dyn PipelineBehavior<R>>],
        handler: &'a dyn RequestHandler<R>,
    ) -> Self {
        Self { behaviors, handler }
    }

    /// Number of behaviors still ahead of the handler
    pub fn remaining(&self) -> usize {
        self.behaviors.len()
    }

    pub async fn run(self, request: R, cancel: &CancellationToken) -> CourierResult<R::Response> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => {
                behavior
                    .handle(request, cancel, Next::new(rest, self.handler))
                    .await
            }
            None => {
                if cancel.is_cancelled() {
                    return Err(CourierError::Cancelled);
                }
                self.handler.handle(request, cancel).await
            }
        }
    }
}

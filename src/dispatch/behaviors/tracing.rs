//! Outermost stage: a span per request plus outcome and timing logs.

use std::marker::PhantomData;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::dispatch::pipeline::{Next, PipelineBehavior};
use crate::dispatch::request::{Request, Response};
use crate::error::CourierResult;

pub struct TracingBehavior<R> {
    _request: PhantomData<fn() -> R>,
}

impl<R> TracingBehavior<R> {
    pub fn new() -> Self {
        Self {
            _request: PhantomData,
        }
    }
}

impl<R> Default for TracingBehavior<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Request> PipelineBehavior<R> for TracingBehavior<R> {
    async fn handle(
        &self,
        request: R,
        cancel: &CancellationToken,
        next: Next<'_, R>,
    ) -> CourierResult<R::Response> {
        let request_name = R::request_name();
        let span = info_span!("dispatch", request = request_name);
        let started = Instant::now();

        let result = next.run(request, cancel).instrument(span).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) if response.is_failure() => {
                debug!(request = request_name, elapsed_ms, "Request completed with failure response");
            }
            Ok(_) => debug!(request = request_name, elapsed_ms, "Request handled"),
            Err(error) if error.is_cancelled() => {
                debug!(request = request_name, elapsed_ms, "Request cancelled");
            }
            Err(error) => warn!(
                request = request_name,
                elapsed_ms,
                code = error.code(),
                error = %error,
                "Request failed"
            ),
        }
        result
    }
}

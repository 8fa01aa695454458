//! Request, response and handler contracts.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CourierError, CourierResult};

/// A command or query with a statically known response type
pub trait Request: Send + Sync + 'static {
    type Response: Response;

    /// Name used in logs and configuration errors
    fn request_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// How a response type represents failure.
///
/// Result-shaped responses ([`CourierResult<T>`]) carry the failure as a
/// value, so a rejected request still produces a response. Every other type
/// keeps the defaults and the pipeline raises the error instead.
pub trait Response: Send + Sized + 'static {
    /// Build a failure response, or hand `error` back to be raised
    fn from_error(error: CourierError) -> Result<Self, CourierError> {
        Err(error)
    }

    fn is_failure(&self) -> bool {
        false
    }
}

impl<T: Send + 'static> Response for CourierResult<T> {
    fn from_error(error: CourierError) -> Result<Self, CourierError> {
        Ok(Err(error))
    }

    fn is_failure(&self) -> bool {
        self.is_err()
    }
}

macro_rules! plain_response {
    ($($ty:ty),* $(,)?) => {
        $(impl Response for $ty {})*
    };
}

plain_response!(
    (),
    bool,
    String,
    i32,
    i64,
    u32,
    u64,
    usize,
    f64,
    Uuid,
    serde_json::Value,
);

impl<T: Send + 'static> Response for Vec<T> {}

impl<T: Send + 'static> Response for Option<T> {}

/// Handles requests of type `R`. Exactly one handler is registered per type.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, request: R, cancel: &CancellationToken)
        -> CourierResult<R::Response>;
}

//! Cooperative cancellation for dispatch and publish calls.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{CourierError, CourierResult};

/// Race `future` against `cancel`.
///
/// A token that is already cancelled wins without polling the future, so no
/// work is started on behalf of an abandoned call. If the token fires while
/// the future is pending, the future is dropped and `Cancelled` is returned.
pub async fn with_cancellation<T, F>(cancel: &CancellationToken, future: F) -> CourierResult<T>
where
    F: Future<Output = CourierResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(CourierError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CourierError::Cancelled),
        result = future => result,
    }
}

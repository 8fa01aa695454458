use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CourierError, CourierResult};

/// Tracks whether an adapter has been closed.
///
/// `begin_close` returns `true` for exactly one caller, which then owns
/// transport teardown.
#[derive(Debug, Default)]
pub(crate) struct CloseGuard {
    closed: AtomicBool,
}

impl CloseGuard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn ensure_open(&self, backend: &str) -> CourierResult<()> {
        if self.is_closed() {
            return Err(CourierError::broker_connection(
                backend,
                "event bus has been closed",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_is_granted_once() {
        let guard = CloseGuard::new();
        assert!(guard.ensure_open("kafka").is_ok());

        assert!(guard.begin_close());
        assert!(!guard.begin_close());
        assert!(guard.is_closed());

        let error = guard.ensure_open("kafka").unwrap_err();
        assert_eq!(error.code(), "BROKER_CONNECTION_ERROR");
    }
}

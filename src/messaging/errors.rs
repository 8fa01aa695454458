//! # Transport Error Types
//!
//! Backend-level failures reported by a [`BrokerTransport`](super::BrokerTransport).
//! Adapters translate them into the two broker outcomes callers see:
//! `BrokerConnection` (no usable connection) and `BrokerPublish` (the broker
//! rejected or timed out this particular send).

use thiserror::Error;

use crate::error::CourierError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection unavailable: {0}")]
    Connection(String),

    #[error("rejected by broker: {0}")]
    Rejected(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// True when the failure means the adapter has no usable connection
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Closed)
    }

    /// Map into the caller-facing error for a send to `destination`
    pub fn into_courier_error(self, backend: &str, destination: &str) -> CourierError {
        if self.is_connection_failure() {
            CourierError::broker_connection(backend, self.to_string())
        } else {
            CourierError::broker_publish(backend, destination, self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures_map_to_broker_connection() {
        let error = TransportError::connection("refused").into_courier_error("rabbitmq", "x");
        assert_eq!(error.code(), "BROKER_CONNECTION_ERROR");

        let error = TransportError::Closed.into_courier_error("rabbitmq", "x");
        assert_eq!(error.code(), "BROKER_CONNECTION_ERROR");
    }

    #[test]
    fn test_send_failures_keep_backend_diagnostic() {
        let error = TransportError::rejected("NOT_FOUND - no exchange 'orders'")
            .into_courier_error("rabbitmq", "orders");

        assert_eq!(error.code(), "BROKER_PUBLISH_ERROR");
        assert!(error.to_string().contains("NOT_FOUND - no exchange 'orders'"));

        let error = TransportError::timeout("Message timed out").into_courier_error("kafka", "t");
        assert_eq!(error.code(), "BROKER_PUBLISH_ERROR");
    }
}

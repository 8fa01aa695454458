//! # Event Bus Traits
//!
//! [`EventBus`] is what application code publishes through. Each broker
//! adapter implements it on top of a [`BrokerTransport`], the raw backend I/O
//! that owns the connection and speaks the backend's native message type.

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::CourierResult;
use crate::events::{Event, IntegrationEvent};
use crate::messaging::TransportError;

/// Publishes integration events to a broker.
///
/// Implementations are safe to share between tasks. Failures are always
/// returned as errors:
///
/// - `BrokerConnection` when there is no usable connection (including after
///   [`close`](EventBus::close))
/// - `BrokerPublish` when the broker rejected or timed out a send, or the
///   message exceeds the configured size limit
/// - `Cancelled` when the token fired before the send completed; whether the
///   broker received the message is then unknown
///
/// A batch is not atomic on any backend: `Ok` means every event was
/// acknowledged, an error means some events may already be delivered.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: &Event, cancel: &CancellationToken) -> CourierResult<()>;

    /// Publish several events. An empty slice succeeds without contacting the broker.
    async fn publish_batch(&self, events: &[Event], cancel: &CancellationToken)
        -> CourierResult<()>;

    /// Release the underlying connection. Later calls are no-ops.
    async fn close(&self) -> CourierResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;

    /// Capture a typed event and publish it
    async fn publish_event<E>(&self, event: &E, cancel: &CancellationToken) -> CourierResult<()>
    where
        E: IntegrationEvent,
        Self: Sized,
    {
        let event = Event::new(event)?;
        self.publish(&event, cancel).await
    }
}

/// Raw message I/O for one broker backend.
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// The backend's native outgoing message
    type Message: Send + Sync + 'static;

    /// Send one message and wait for the broker's acknowledgement
    async fn send(&self, message: Self::Message) -> Result<(), TransportError>;

    /// Send several messages as one unit.
    ///
    /// The default sends them concurrently and reports the first failure;
    /// messages that were acknowledged stay delivered.
    async fn send_batch(&self, messages: Vec<Self::Message>) -> Result<(), TransportError> {
        let results = join_all(messages.into_iter().map(|message| self.send(message))).await;
        results.into_iter().collect()
    }

    async fn close(&self) -> Result<(), TransportError>;
}

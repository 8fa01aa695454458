//! # Service Bus Event Bus
//!
//! Topic/session adapter. Every event goes to one configured topic; the event
//! type becomes the message subject (`Label`) so subscriptions filter on it.
//! With `use_sessions` each message also gets a fresh session id.
//!
//! Application properties carried on every message:
//!
//! | Property | Value |
//! |----------|-------|
//! | `EventType` | event type |
//! | `Timestamp` | RFC 3339 publish time |

#[cfg(feature = "service-bus")]
mod client;

#[cfg(feature = "service-bus")]
pub use client::{sas_token, ServiceBusRestTransport};

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::ServiceBusConfig;
use crate::constants::service_bus_properties;
use crate::error::{CourierError, CourierResult};
use crate::events::Event;
use crate::messaging::service::{BrokerTransport, CloseGuard, EventBus};
use crate::messaging::BrokerEnvelope;
use crate::utils::with_cancellation;

const BACKEND: &str = "service_bus";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBusMessage {
    pub message_id: String,
    pub session_id: Option<String>,
    pub subject: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub application_properties: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct ServiceBusEventBus<T> {
    transport: T,
    topic: String,
    use_sessions: bool,
    max_message_bytes: usize,
    lifecycle: CloseGuard,
}

#[cfg(feature = "service-bus")]
impl ServiceBusEventBus<ServiceBusRestTransport> {
    pub fn connect(config: &ServiceBusConfig) -> CourierResult<Self> {
        let transport = ServiceBusRestTransport::new(config)
            .map_err(|e| CourierError::broker_connection(BACKEND, e.to_string()))?;
        Ok(Self::new(transport, config))
    }
}

impl<T> ServiceBusEventBus<T>
where
    T: BrokerTransport<Message = ServiceBusMessage>,
{
    pub fn new(transport: T, config: &ServiceBusConfig) -> Self {
        Self {
            transport,
            topic: config.topic.clone(),
            use_sessions: config.use_sessions,
            max_message_bytes: config.max_message_bytes,
            lifecycle: CloseGuard::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn message_for(&self, event: &Event) -> CourierResult<ServiceBusMessage> {
        let mut envelope = BrokerEnvelope::from_event(event)?;
        if self.use_sessions {
            envelope = envelope.with_key(Uuid::new_v4().to_string());
        }
        envelope.ensure_size_within(self.max_message_bytes, BACKEND, &self.topic)?;

        let application_properties = BTreeMap::from([
            (
                service_bus_properties::EVENT_TYPE.to_string(),
                envelope.event_type().to_string(),
            ),
            (
                service_bus_properties::TIMESTAMP.to_string(),
                envelope.timestamp_header(),
            ),
        ]);

        Ok(ServiceBusMessage {
            message_id: envelope.message_id().to_string(),
            session_id: envelope.key().map(str::to_string),
            subject: envelope.event_type().to_string(),
            content_type: envelope.content_type().to_string(),
            application_properties,
            body: envelope.into_body(),
        })
    }
}

#[async_trait]
impl<T> EventBus for ServiceBusEventBus<T>
where
    T: BrokerTransport<Message = ServiceBusMessage>,
{
    async fn publish(&self, event: &Event, cancel: &CancellationToken) -> CourierResult<()> {
        self.lifecycle.ensure_open(BACKEND)?;
        let message = self.message_for(event)?;
        let subject = message.subject.clone();

        with_cancellation(cancel, async {
            self.transport
                .send(message)
                .await
                .map_err(|e| e.into_courier_error(BACKEND, &self.topic))?;
            debug!(
                backend = BACKEND,
                topic = %self.topic,
                subject = %subject,
                "Published event"
            );
            Ok(())
        })
        .await
    }

    /// Sends all messages in one request
    async fn publish_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> CourierResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.lifecycle.ensure_open(BACKEND)?;

        let messages = events
            .iter()
            .map(|event| self.message_for(event))
            .collect::<CourierResult<Vec<_>>>()?;
        let count = messages.len();

        with_cancellation(cancel, async {
            self.transport
                .send_batch(messages)
                .await
                .map_err(|e| e.into_courier_error(BACKEND, &self.topic))?;
            debug!(backend = BACKEND, topic = %self.topic, count, "Published event batch");
            Ok(())
        })
        .await
    }

    async fn close(&self) -> CourierResult<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.transport
            .close()
            .await
            .map_err(|e| CourierError::broker_connection(BACKEND, format!("close failed: {e}")))?;
        debug!(backend = BACKEND, "Event bus closed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

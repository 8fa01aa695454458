//! # RabbitMQ Event Bus
//!
//! Topic-exchange adapter. Events are published to one durable topic
//! exchange with the event type as routing key, so consumers bind queues by
//! event type pattern (`Order.*`, `#`).
//!
//! Messages are persistent and the channel runs in publisher-confirm mode; a
//! publish succeeds only once the broker acks it.

#[cfg(feature = "rabbitmq")]
mod client;

#[cfg(feature = "rabbitmq")]
pub use client::LapinTransport;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RabbitmqConfig;
use crate::constants::AMQP_PERSISTENT_DELIVERY_MODE;
use crate::error::{CourierError, CourierResult};
use crate::events::Event;
use crate::messaging::service::{BrokerTransport, CloseGuard, EventBus};
use crate::messaging::BrokerEnvelope;
use crate::utils::with_cancellation;

const BACKEND: &str = "rabbitmq";

/// A basic.publish with its properties
#[derive(Debug, Clone, PartialEq)]
pub struct AmqpMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    /// AMQP `type` property
    pub kind: String,
    pub message_id: String,
    /// Unix seconds
    pub timestamp: u64,
    pub delivery_mode: u8,
}

#[derive(Debug)]
pub struct RabbitMqEventBus<T> {
    transport: T,
    exchange: String,
    max_message_bytes: usize,
    lifecycle: CloseGuard,
}

#[cfg(feature = "rabbitmq")]
impl RabbitMqEventBus<LapinTransport> {
    /// Connect, enable publisher confirms and declare the exchange
    pub async fn connect(config: &RabbitmqConfig) -> CourierResult<Self> {
        let transport = LapinTransport::connect(config)
            .await
            .map_err(|e| CourierError::broker_connection(BACKEND, e.to_string()))?;
        Ok(Self::new(transport, config))
    }
}

impl<T> RabbitMqEventBus<T>
where
    T: BrokerTransport<Message = AmqpMessage>,
{
    pub fn new(transport: T, config: &RabbitmqConfig) -> Self {
        Self {
            transport,
            exchange: config.exchange.clone(),
            max_message_bytes: config.max_message_bytes,
            lifecycle: CloseGuard::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    fn message_for(&self, event: &Event) -> CourierResult<AmqpMessage> {
        let envelope = BrokerEnvelope::from_event(event)?;
        envelope.ensure_size_within(self.max_message_bytes, BACKEND, &self.exchange)?;

        Ok(AmqpMessage {
            exchange: self.exchange.clone(),
            routing_key: envelope.event_type().to_string(),
            content_type: envelope.content_type().to_string(),
            kind: envelope.event_type().to_string(),
            message_id: envelope.message_id().to_string(),
            timestamp: u64::try_from(envelope.timestamp().timestamp()).unwrap_or_default(),
            delivery_mode: AMQP_PERSISTENT_DELIVERY_MODE,
            body: envelope.into_body(),
        })
    }
}

#[async_trait]
impl<T> EventBus for RabbitMqEventBus<T>
where
    T: BrokerTransport<Message = AmqpMessage>,
{
    async fn publish(&self, event: &Event, cancel: &CancellationToken) -> CourierResult<()> {
        self.lifecycle.ensure_open(BACKEND)?;
        let message = self.message_for(event)?;
        let routing_key = message.routing_key.clone();

        with_cancellation(cancel, async {
            self.transport
                .send(message)
                .await
                .map_err(|e| e.into_courier_error(BACKEND, &self.exchange))?;
            debug!(
                backend = BACKEND,
                exchange = %self.exchange,
                routing_key = %routing_key,
                "Published event"
            );
            Ok(())
        })
        .await
    }

    /// Publishes every message on the shared channel, then awaits all
    /// confirms together.
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
                .map_err(|e| e.into_courier_error(BACKEND, &self.exchange))?;
            debug!(backend = BACKEND, exchange = %self.exchange, count, "Published event batch");
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

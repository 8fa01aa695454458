//! # Kafka Event Bus
//!
//! Partitioned-log adapter. Each event goes to the topic
//! `topic_prefix + event_type` with a fresh UUID key, so events spread over
//! partitions and no ordering is promised between them.
//!
//! | Record part | Value |
//! |-------------|-------|
//! | topic | `topic_prefix + event_type` |
//! | key | random UUID |
//! | payload | event JSON |
//! | headers | `event-type`, `timestamp`, `message-id` |

#[cfg(feature = "kafka")]
mod client;

#[cfg(feature = "kafka")]
pub use client::RdKafkaTransport;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::KafkaConfig;
use crate::constants::kafka_headers;
use crate::error::{CourierError, CourierResult};
use crate::events::Event;
use crate::messaging::service::{BrokerTransport, CloseGuard, EventBus};
use crate::messaging::BrokerEnvelope;
use crate::utils::with_cancellation;

const BACKEND: &str = "kafka";

/// A producer record ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl KafkaRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Kafka adapter over any transport that sends [`KafkaRecord`]s
#[derive(Debug)]
pub struct KafkaEventBus<T> {
    transport: T,
    config: KafkaConfig,
    lifecycle: CloseGuard,
}

#[cfg(feature = "kafka")]
impl KafkaEventBus<RdKafkaTransport> {
    /// Create an rdkafka producer from `config`
    pub fn connect(config: &KafkaConfig) -> CourierResult<Self> {
        let transport = RdKafkaTransport::new(config)
            .map_err(|e| CourierError::broker_connection(BACKEND, e.to_string()))?;
        Ok(Self::new(transport, config))
    }
}

impl<T> KafkaEventBus<T>
where
    T: BrokerTransport<Message = KafkaRecord>,
{
    pub fn new(transport: T, config: &KafkaConfig) -> Self {
        Self {
            transport,
            config: config.clone(),
            lifecycle: CloseGuard::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn record_for(&self, event: &Event) -> CourierResult<KafkaRecord> {
        let topic = self.config.topic_for(event.event_type());
        let envelope = BrokerEnvelope::from_event(event)?.with_key(Uuid::new_v4().to_string());
        envelope.ensure_size_within(self.config.max_message_bytes, BACKEND, &topic)?;

        let headers = vec![
            (
                kafka_headers::EVENT_TYPE.to_string(),
                envelope.event_type().to_string(),
            ),
            (
                kafka_headers::TIMESTAMP.to_string(),
                envelope.timestamp_header(),
            ),
            (
                kafka_headers::MESSAGE_ID.to_string(),
                envelope.message_id().to_string(),
            ),
        ];
        let key = envelope.key().unwrap_or_default().to_string();

        Ok(KafkaRecord {
            topic,
            key,
            payload: envelope.into_body(),
            headers,
        })
    }

    async fn send_record(&self, record: KafkaRecord) -> CourierResult<()> {
        let topic = record.topic.clone();
        self.transport
            .send(record)
            .await
            .map_err(|e| e.into_courier_error(BACKEND, &topic))?;
        debug!(backend = BACKEND, topic = %topic, "Published event");
        Ok(())
    }
}

#[async_trait]
impl<T> EventBus for KafkaEventBus<T>
where
    T: BrokerTransport<Message = KafkaRecord>,
{
    async fn publish(&self, event: &Event, cancel: &CancellationToken) -> CourierResult<()> {
        self.lifecycle.ensure_open(BACKEND)?;
        let record = self.record_for(event)?;
        with_cancellation(cancel, self.send_record(record)).await
    }

    /// One concurrent send per event. Records acknowledged before a failure
    /// stay delivered.
    async fn publish_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> CourierResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.lifecycle.ensure_open(BACKEND)?;

        let records = events
            .iter()
            .map(|event| self.record_for(event))
            .collect::<CourierResult<Vec<_>>>()?;
        let count = records.len();

        with_cancellation(cancel, async {
            let results = join_all(records.into_iter().map(|record| self.send_record(record))).await;
            let failed = results.iter().filter(|result| result.is_err()).count();
            if failed > 0 {
                warn!(backend = BACKEND, count, failed, "Event batch partially failed");
            }
            results.into_iter().collect::<CourierResult<()>>()
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

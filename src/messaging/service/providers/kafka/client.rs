//! rdkafka-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::info;

use super::KafkaRecord;
use crate::config::KafkaConfig;
use crate::constants::KAFKA_MAX_IDEMPOTENT_IN_FLIGHT;
use crate::messaging::service::BrokerTransport;
use crate::messaging::TransportError;

/// Idempotent `FutureProducer` with `acks=all`
pub struct RdKafkaTransport {
    producer: FutureProducer,
    queue_timeout: Duration,
    flush_timeout: Duration,
}

impl std::fmt::Debug for RdKafkaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdKafkaTransport")
            .field("queue_timeout", &self.queue_timeout)
            .finish_non_exhaustive()
    }
}

impl RdKafkaTransport {
    pub fn new(config: &KafkaConfig) -> Result<Self, TransportError> {
        let producer: FutureProducer = producer_config(config)
            .create()
            .map_err(|e| TransportError::connection(format!("failed to create producer: {e}")))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            compression = config.compression.as_str(),
            linger_ms = config.linger_ms(),
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            queue_timeout: config.message_timeout(),
            flush_timeout: config.message_timeout(),
        })
    }
}

fn producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("enable.idempotence", "true")
        .set("acks", "all")
        .set(
            "max.in.flight.requests.per.connection",
            config
                .max_in_flight
                .min(KAFKA_MAX_IDEMPOTENT_IN_FLIGHT)
                .to_string(),
        )
        .set("compression.type", config.compression.as_str())
        .set("linger.ms", config.linger_ms().to_string())
        .set("message.max.bytes", config.max_message_bytes.to_string())
        .set("message.timeout.ms", config.message_timeout_ms.to_string());

    if let Some((username, password)) = config.sasl_credentials() {
        client
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }
    client
}

fn classify(error: KafkaError) -> TransportError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::AllBrokersDown | RDKafkaErrorCode::BrokerTransportFailure) => {
            TransportError::connection(error.to_string())
        }
        Some(RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::RequestTimedOut) => {
            TransportError::timeout(error.to_string())
        }
        _ => TransportError::rejected(error.to_string()),
    }
}

#[async_trait]
impl BrokerTransport for RdKafkaTransport {
    type Message = KafkaRecord;

    async fn send(&self, message: KafkaRecord) -> Result<(), TransportError> {
        let mut headers = OwnedHeaders::new();
        for (key, value) in &message.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            });
        }

        let record = FutureRecord::to(&message.topic)
            .key(message.key.as_str())
            .payload(message.payload.as_slice())
            .headers(headers);

        self.producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
            .map(|_| ())
            .map_err(|(error, _)| classify(error))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;

        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| TransportError::connection(format!("flush task failed: {e}")))?
            .map_err(classify)
    }
}

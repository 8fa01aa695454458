//! # Event Bus Provider Enum
//!
//! Enum dispatch over the broker adapters, avoiding trait object overhead on
//! every publish. Variants for backends whose cargo feature is disabled do
//! not exist; selecting such a backend in configuration is a
//! `ConfigurationError` at connect time.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::providers::InMemoryEventBus;
use super::traits::EventBus;
use crate::config::{BrokerBackend, BrokerSettings};
use crate::error::{CourierError, CourierResult};
use crate::events::Event;

#[cfg(feature = "kafka")]
use super::providers::{KafkaEventBus, RdKafkaTransport};
#[cfg(feature = "rabbitmq")]
use super::providers::{LapinTransport, RabbitMqEventBus};
#[cfg(feature = "service-bus")]
use super::providers::{ServiceBusEventBus, ServiceBusRestTransport};

/// The configured event bus
///
/// # Example
///
/// ```rust
/// use courier_core::config::BrokerSettings;
/// use courier_core::messaging::{EventBus, EventBusProvider};
///
/// # async fn example() -> Result<(), courier_core::CourierError> {
/// let bus = EventBusProvider::connect(&BrokerSettings::in_memory()).await?;
/// assert_eq!(bus.backend_name(), "in_memory");
/// # Ok(())
/// # }
/// ```
pub enum EventBusProvider {
    /// Kafka via rdkafka
    #[cfg(feature = "kafka")]
    Kafka(KafkaEventBus<RdKafkaTransport>),

    /// RabbitMQ via lapin
    #[cfg(feature = "rabbitmq")]
    RabbitMq(RabbitMqEventBus<LapinTransport>),

    /// Azure Service Bus over REST
    #[cfg(feature = "service-bus")]
    ServiceBus(ServiceBusEventBus<ServiceBusRestTransport>),

    /// In-process recorder for tests and local development
    InMemory(InMemoryEventBus),
}

impl std::fmt::Debug for EventBusProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventBusProvider")
            .field(&self.backend_name())
            .finish()
    }
}

impl From<InMemoryEventBus> for EventBusProvider {
    fn from(bus: InMemoryEventBus) -> Self {
        Self::InMemory(bus)
    }
}

impl EventBusProvider {
    /// Build the adapter selected by `settings.backend`
    pub async fn connect(settings: &BrokerSettings) -> CourierResult<Self> {
        settings.ensure_backend_section()?;

        let provider = match settings.backend {
            BrokerBackend::Kafka => Self::connect_kafka(settings)?,
            BrokerBackend::Rabbitmq => Self::connect_rabbitmq(settings).await?,
            BrokerBackend::ServiceBus => Self::connect_service_bus(settings)?,
            BrokerBackend::InMemory => Self::InMemory(InMemoryEventBus::new()),
        };

        info!(backend = provider.backend_name(), "Event bus connected");
        Ok(provider)
    }

    /// The in-memory adapter, when that is the selected backend
    #[allow(unreachable_patterns)]
    pub fn as_in_memory(&self) -> Option<&InMemoryEventBus> {
        match self {
            Self::InMemory(bus) => Some(bus),
            _ => None,
        }
    }

    #[cfg(feature = "kafka")]
    fn connect_kafka(settings: &BrokerSettings) -> CourierResult<Self> {
        let config = settings
            .kafka
            .as_ref()
            .ok_or_else(|| missing_section(BrokerBackend::Kafka))?;
        Ok(Self::Kafka(KafkaEventBus::connect(config)?))
    }

    #[cfg(not(feature = "kafka"))]
    fn connect_kafka(_settings: &BrokerSettings) -> CourierResult<Self> {
        Err(feature_disabled(BrokerBackend::Kafka, "kafka"))
    }

    #[cfg(feature = "rabbitmq")]
    async fn connect_rabbitmq(settings: &BrokerSettings) -> CourierResult<Self> {
        let config = settings
            .rabbitmq
            .as_ref()
            .ok_or_else(|| missing_section(BrokerBackend::Rabbitmq))?;
        Ok(Self::RabbitMq(RabbitMqEventBus::connect(config).await?))
    }

    #[cfg(not(feature = "rabbitmq"))]
    async fn connect_rabbitmq(_settings: &BrokerSettings) -> CourierResult<Self> {
        Err(feature_disabled(BrokerBackend::Rabbitmq, "rabbitmq"))
    }

    #[cfg(feature = "service-bus")]
    fn connect_service_bus(settings: &BrokerSettings) -> CourierResult<Self> {
        let config = settings
            .service_bus
            .as_ref()
            .ok_or_else(|| missing_section(BrokerBackend::ServiceBus))?;
        Ok(Self::ServiceBus(ServiceBusEventBus::connect(config)?))
    }

    #[cfg(not(feature = "service-bus"))]
    fn connect_service_bus(_settings: &BrokerSettings) -> CourierResult<Self> {
        Err(feature_disabled(BrokerBackend::ServiceBus, "service-bus"))
    }
}

#[allow(dead_code)]
fn missing_section(backend: BrokerBackend) -> CourierError {
    CourierError::configuration(format!("[broker.{backend}] is not configured"))
}

#[allow(dead_code)]
fn feature_disabled(backend: BrokerBackend, feature: &str) -> CourierError {
    CourierError::configuration(format!(
        "broker backend '{backend}' requires the '{feature}' cargo feature"
    ))
}

#[async_trait]
impl EventBus for EventBusProvider {
    async fn publish(&self, event: &Event, cancel: &CancellationToken) -> CourierResult<()> {
        match self {
            #[cfg(feature = "kafka")]
            Self::Kafka(bus) => bus.publish(event, cancel).await,
            #[cfg(feature = "rabbitmq")]
            Self::RabbitMq(bus) => bus.publish(event, cancel).await,
            #[cfg(feature = "service-bus")]
            Self::ServiceBus(bus) => bus.publish(event, cancel).await,
            Self::InMemory(bus) => bus.publish(event, cancel).await,
        }
    }

    async fn publish_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> CourierResult<()> {
        match self {
            #[cfg(feature = "kafka")]
            Self::Kafka(bus) => bus.publish_batch(events, cancel).await,
            #[cfg(feature = "rabbitmq")]
            Self::RabbitMq(bus) => bus.publish_batch(events, cancel).await,
            #[cfg(feature = "service-bus")]
            Self::ServiceBus(bus) => bus.publish_batch(events, cancel).await,
            Self::InMemory(bus) => bus.publish_batch(events, cancel).await,
        }
    }

    async fn close(&self) -> CourierResult<()> {
        match self {
            #[cfg(feature = "kafka")]
            Self::Kafka(bus) => bus.close().await,
            #[cfg(feature = "rabbitmq")]
            Self::RabbitMq(bus) => bus.close().await,
            #[cfg(feature = "service-bus")]
            Self::ServiceBus(bus) => bus.close().await,
            Self::InMemory(bus) => bus.close().await,
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "kafka")]
            Self::Kafka(bus) => bus.backend_name(),
            #[cfg(feature = "rabbitmq")]
            Self::RabbitMq(bus) => bus.backend_name(),
            #[cfg(feature = "service-bus")]
            Self::ServiceBus(bus) => bus.backend_name(),
            Self::InMemory(bus) => bus.backend_name(),
        }
    }
}

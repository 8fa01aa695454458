//! # Event Bus Providers
//!
//! One adapter per backend. The Kafka, RabbitMQ and Service Bus adapters are
//! generic over a [`BrokerTransport`](crate::messaging::BrokerTransport); the
//! real transport for each lives in its `client` module behind a cargo
//! feature, while the adapters themselves are always compiled.

pub mod in_memory;
pub mod kafka;
pub mod rabbitmq;
pub mod service_bus;

pub use in_memory::InMemoryEventBus;
pub use kafka::{KafkaEventBus, KafkaRecord};
pub use rabbitmq::{AmqpMessage, RabbitMqEventBus};
pub use service_bus::{ServiceBusEventBus, ServiceBusMessage};

#[cfg(feature = "kafka")]
pub use kafka::RdKafkaTransport;
#[cfg(feature = "rabbitmq")]
pub use rabbitmq::LapinTransport;
#[cfg(feature = "service-bus")]
pub use service_bus::ServiceBusRestTransport;

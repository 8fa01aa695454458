//! # Event Bus Service
//!
//! Provider-agnostic publishing of integration events.
//!
//! ## Module Structure
//!
//! - `traits` - [`EventBus`] and [`BrokerTransport`] contracts
//! - `lifecycle` - close-once guard shared by every adapter
//! - `provider` - [`EventBusProvider`] enum dispatch over the adapters
//! - `providers` - Kafka, RabbitMQ, Service Bus and in-memory adapters
//!
//! ## Usage
//!
//! ```rust
//! use courier_core::config::BrokerSettings;
//! use courier_core::events::Event;
//! use courier_core::messaging::{EventBus, EventBusProvider};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), courier_core::CourierError> {
//! let bus = EventBusProvider::connect(&BrokerSettings::default()).await?;
//! let event = Event::from_parts("OrderCreated", serde_json::json!({"id": 1}))?;
//!
//! bus.publish(&event, &CancellationToken::new()).await?;
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```

mod lifecycle;
pub mod provider;
pub mod providers;
pub mod traits;

pub(crate) use lifecycle::CloseGuard;
pub use provider::EventBusProvider;
pub use traits::{BrokerTransport, EventBus};

#![allow(clippy::doc_markdown)] // Allow technical terms like RabbitMQ, librdkafka in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Courier Core
//!
//! Reliable messaging and idempotent dispatch for async Rust services.
//!
//! ## Overview
//!
//! Three pieces that are used together or separately:
//!
//! - **Request dispatch**: typed commands and queries routed through a fixed
//!   pipeline (tracing, validation, custom behaviors) to exactly one handler
//! - **Event bus**: integration events published to Kafka, RabbitMQ, Azure
//!   Service Bus or an in-memory recorder behind one [`EventBus`] contract
//! - **Idempotency**: an operation keyed by a caller-chosen string runs at
//!   most once, even when retried concurrently
//!
//! ## Module Organization
//!
//! - [`dispatch`] - Dispatcher, handler registry and pipeline behaviors
//! - [`validation`] - Validator contract and `validator` derive adapter
//! - [`events`] - Event envelope and event type registry
//! - [`messaging`] - Event bus contract, broker envelope and adapters
//! - [`idempotency`] - Idempotency handler and store contract
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Structured error handling
//! - [`logging`] - Console logging setup
//!
//! ## Cargo Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `rabbitmq` | yes | lapin transport |
//! | `service-bus` | yes | Service Bus REST transport |
//! | `kafka` | no | rdkafka transport (needs librdkafka) |
//! | `benchmarks` | no | criterion benches |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_core::config::ConfigLoader;
//! use courier_core::events::Event;
//! use courier_core::messaging::{EventBus, EventBusProvider};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> courier_core::CourierResult<()> {
//! let config = ConfigLoader::new().load_from_env()?;
//! courier_core::logging::init_tracing_for(&config);
//!
//! let bus = EventBusProvider::connect(&config.broker).await?;
//!
//! let event = Event::from_parts("OrderCreated", serde_json::json!({"order_id": 7}))?;
//! bus.publish(&event, &CancellationToken::new()).await?;
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod logging;
pub mod messaging;
pub mod utils;
pub mod validation;

pub use config::{ConfigLoader, CourierConfig};
pub use dispatch::{Dispatcher, HandlerRegistry, PipelineBehavior, Request, RequestHandler, Response};
pub use error::{CourierError, CourierResult, ValidationErrors};
pub use events::{Event, EventTypeRegistry, IntegrationEvent};
pub use idempotency::{IdempotencyHandler, IdempotencyStore, InMemoryIdempotencyStore};
pub use messaging::{BrokerEnvelope, EventBus, EventBusProvider};
pub use validation::{DeriveValidator, ValidationFailure, Validator};

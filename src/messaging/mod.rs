//! # Messaging
//!
//! The event bus contract, the broker envelope every adapter builds, and the
//! broker adapters themselves (see [`service`]).

pub mod envelope;
pub mod errors;
pub mod service;

pub use envelope::BrokerEnvelope;
pub use errors::TransportError;
pub use service::{BrokerTransport, EventBus, EventBusProvider};

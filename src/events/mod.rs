//! # Integration Events
//!
//! Immutable event values published through the event bus, and the registry
//! consumers use to turn a received body back into a typed event by its
//! `event-type` header.

pub mod registry;
pub mod types;

pub use registry::{DecodedEvent, EventTypeRegistry};
pub use types::{Event, IntegrationEvent};

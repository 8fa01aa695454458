//! Decoding received bodies by event type name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::{CourierError, CourierResult};

use super::types::IntegrationEvent;

type DecodeFn = fn(&[u8]) -> CourierResult<Box<dyn Any + Send>>;

fn decode_body<E>(body: &[u8]) -> CourierResult<Box<dyn Any + Send>>
where
    E: IntegrationEvent + DeserializeOwned + 'static,
{
    let event: E = serde_json::from_slice(body)?;
    Ok(Box::new(event))
}

/// A body decoded into its registered event type
pub struct DecodedEvent {
    event_type: String,
    value: Box<dyn Any + Send>,
}

impl DecodedEvent {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn is<E: 'static>(&self) -> bool {
        self.value.is::<E>()
    }

    pub fn downcast<E: 'static>(self) -> Result<E, Self> {
        match self.value.downcast::<E>() {
            Ok(event) => Ok(*event),
            Err(value) => Err(Self {
                event_type: self.event_type,
                value,
            }),
        }
    }
}

impl fmt::Debug for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedEvent")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

/// Maps `event-type` header values to decoders.
///
/// Built once by a consumer (or a test harness) and then shared read-only.
#[derive(Default)]
pub struct EventTypeRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register<E>(mut self) -> Self
    where
        E: IntegrationEvent + DeserializeOwned + 'static,
    {
        self.decoders.insert(E::EVENT_TYPE, decode_body::<E>);
        self
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn decode(&self, event_type: &str, body: &[u8]) -> CourierResult<DecodedEvent> {
        let decode = self.decoders.get(event_type).ok_or_else(|| {
            CourierError::serialization(format!("unknown event type '{event_type}'"))
        })?;

        Ok(DecodedEvent {
            event_type: event_type.to_string(),
            value: decode(body)?,
        })
    }
}

impl fmt::Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("EventTypeRegistry")
            .field("event_types", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderCreated {
        id: u64,
    }

    impl IntegrationEvent for OrderCreated {
        const EVENT_TYPE: &'static str = "OrderCreated";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderCancelled {
        id: u64,
        reason: String,
    }

    impl IntegrationEvent for OrderCancelled {
        const EVENT_TYPE: &'static str = "OrderCancelled";
    }

    #[test]
    fn test_decode_selects_type_by_name() {
        let registry = EventTypeRegistry::new()
            .register::<OrderCreated>()
            .register::<OrderCancelled>();

        let body = Event::new(&OrderCreated { id: 1 }).unwrap().to_body().unwrap();
        let decoded = registry.decode("OrderCreated", &body).unwrap();

        assert!(decoded.is::<OrderCreated>());
        assert_eq!(decoded.downcast::<OrderCreated>().unwrap(), OrderCreated { id: 1 });
    }

    #[test]
    fn test_unknown_event_type() {
        let registry = EventTypeRegistry::new().register::<OrderCreated>();
        let error = registry.decode("Nope", b"{}").unwrap_err();
        assert_eq!(error.code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_downcast_to_wrong_type_returns_original() {
        let registry = EventTypeRegistry::new().register::<OrderCreated>();
        let decoded = registry.decode("OrderCreated", br#"{"id": 4}"#).unwrap();

        let decoded = decoded.downcast::<OrderCancelled>().unwrap_err();
        assert_eq!(decoded.event_type(), "OrderCreated");
        assert!(decoded.is::<OrderCreated>());
    }
}

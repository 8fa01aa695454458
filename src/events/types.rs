//! Event value types.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CourierError, CourierResult};

/// A user-defined integration event.
///
/// `EVENT_TYPE` names the event on the wire: it selects the Kafka topic
/// suffix, the AMQP routing key and the Service Bus subject, and it is what
/// consumers match on to decode the body.
///
/// The event's fields share one JSON object with the metadata, so an event
/// cannot serialize a field named `event_id`, `event_type` or `occurred_at`;
/// [`Event::new`] rejects it. Rename such a field on the wire with
/// `#[serde(rename = "...")]`.
///
/// ```rust
/// use courier_core::events::{Event, IntegrationEvent};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct OrderCreated {
///     id: u64,
/// }
///
/// impl IntegrationEvent for OrderCreated {
///     const EVENT_TYPE: &'static str = "OrderCreated";
/// }
///
/// let event = Event::new(&OrderCreated { id: 1 }).unwrap();
/// assert_eq!(event.event_type(), "OrderCreated");
/// assert_eq!(event.decode::<OrderCreated>().unwrap(), OrderCreated { id: 1 });
/// ```
pub trait IntegrationEvent: Serialize + Send + Sync {
    const EVENT_TYPE: &'static str;
}

/// Immutable, type-erased event ready to be published.
///
/// The identifier and occurrence timestamp are assigned once at construction.
/// The serialized form is a single JSON object holding the event's own fields
/// next to `event_id`, `event_type` and `occurred_at`, so a consumer can
/// deserialize the body straight into the original event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    event_id: Uuid,
    event_type: String,
    occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

/// Keys reserved for event metadata in the serialized body
const RESERVED_KEYS: [&str; 3] = ["event_id", "event_type", "occurred_at"];

impl Event {
    /// Capture `event` with a fresh identifier and the current time
    pub fn new<E: IntegrationEvent>(event: &E) -> CourierResult<Self> {
        Self::from_parts(E::EVENT_TYPE, serde_json::to_value(event)?)
    }

    /// Build an event from an already serialized payload.
    ///
    /// The payload must be a JSON object (events are named field sets) and
    /// must not use the reserved metadata keys.
    pub fn from_parts(event_type: impl Into<String>, payload: Value) -> CourierResult<Self> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(CourierError::serialization("event type must not be empty"));
        }

        let payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(CourierError::serialization(format!(
                    "event '{event_type}' must serialize to a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        if let Some(key) = RESERVED_KEYS.iter().find(|key| payload.contains_key(**key)) {
            return Err(CourierError::serialization(format!(
                "event '{event_type}' uses reserved field name '{key}'"
            )));
        }

        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type,
            occurred_at: Utc::now(),
            payload,
        })
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Serialize to the body shared by every broker adapter
    pub fn to_body(&self) -> CourierResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a body produced by [`Event::to_body`]
    pub fn from_body(body: &[u8]) -> CourierResult<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Decode the payload into a concrete event type
    pub fn decode<E: IntegrationEvent + DeserializeOwned>(&self) -> CourierResult<E> {
        if self.event_type != E::EVENT_TYPE {
            return Err(CourierError::serialization(format!(
                "cannot decode '{}' as '{}'",
                self.event_type,
                E::EVENT_TYPE
            )));
        }
        Ok(serde_json::from_value(Value::Object(self.payload.clone()))?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

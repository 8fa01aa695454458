//! Adapter-independent wire representation of one event.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::constants::JSON_CONTENT_TYPE;
use crate::error::{CourierError, CourierResult};
use crate::events::Event;

/// What an adapter hands to its backend for one event.
///
/// Built at publish time and never modified; each adapter maps it onto its
/// backend's native message type.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEnvelope {
    message_id: Uuid,
    content_type: &'static str,
    event_type: String,
    timestamp: DateTime<Utc>,
    body: Vec<u8>,
    key: Option<String>,
}

impl BrokerEnvelope {
    /// Serialize `event` into a fresh envelope (new message id, current time)
    pub fn from_event(event: &Event) -> CourierResult<Self> {
        Ok(Self {
            message_id: Uuid::new_v4(),
            content_type: JSON_CONTENT_TYPE,
            event_type: event.event_type().to_string(),
            timestamp: Utc::now(),
            body: event.to_body()?,
            key: None,
        })
    }

    /// Attach a partition or session key
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Timestamp in the RFC 3339 form used for header values
    pub fn timestamp_header(&self) -> String {
        self.timestamp.to_rfc3339()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Reject bodies larger than the backend's configured limit
    pub fn ensure_size_within(
        &self,
        max_bytes: usize,
        backend: &str,
        destination: &str,
    ) -> CourierResult<()> {
        if self.body.len() > max_bytes {
            return Err(CourierError::broker_publish(
                backend,
                destination,
                format!(
                    "message too large: {} bytes exceeds limit of {} bytes",
                    self.body.len(),
                    max_bytes
                ),
            ));
        }
        Ok(())
    }
}

//! # In-Memory Event Bus
//!
//! Records published envelopes in process. Used by tests and local
//! development where no broker is running.

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::defaults;
use crate::error::CourierResult;
use crate::events::Event;
use crate::messaging::service::{CloseGuard, EventBus};
use crate::messaging::BrokerEnvelope;
use crate::utils::with_cancellation;

const BACKEND: &str = "in_memory";

/// Event bus that keeps every published envelope.
///
/// ```rust
/// use courier_core::events::Event;
/// use courier_core::messaging::service::providers::InMemoryEventBus;
/// use courier_core::messaging::EventBus;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), courier_core::CourierError> {
/// let bus = InMemoryEventBus::new();
/// let event = Event::from_parts("OrderCreated", serde_json::json!({"id": 1}))?;
///
/// bus.publish(&event, &CancellationToken::new()).await?;
/// assert_eq!(bus.published()[0].event_type(), "OrderCreated");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryEventBus {
    published: RwLock<Vec<BrokerEnvelope>>,
    max_message_bytes: usize,
    lifecycle: CloseGuard,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_max_message_bytes(defaults::MAX_MESSAGE_BYTES)
    }

    pub fn with_max_message_bytes(max_message_bytes: usize) -> Self {
        Self {
            published: RwLock::new(Vec::new()),
            max_message_bytes,
            lifecycle: CloseGuard::new(),
        }
    }

    /// Snapshot of everything published so far, in publish order
    pub fn published(&self) -> Vec<BrokerEnvelope> {
        self.published.read().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.read().len()
    }

    pub fn clear(&self) {
        self.published.write().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    fn envelope_for(&self, event: &Event) -> CourierResult<BrokerEnvelope> {
        let envelope = BrokerEnvelope::from_event(event)?;
        envelope.ensure_size_within(self.max_message_bytes, BACKEND, event.event_type())?;
        Ok(envelope)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &Event, cancel: &CancellationToken) -> CourierResult<()> {
        self.lifecycle.ensure_open(BACKEND)?;
        let envelope = self.envelope_for(event)?;

        with_cancellation(cancel, async {
            debug!(
                backend = BACKEND,
                event_type = %envelope.event_type(),
                message_id = %envelope.message_id(),
                "Recorded event"
            );
            self.published.write().push(envelope);
            Ok(())
        })
        .await
    }

    async fn publish_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> CourierResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.lifecycle.ensure_open(BACKEND)?;

        let envelopes = events
            .iter()
            .map(|event| self.envelope_for(event))
            .collect::<CourierResult<Vec<_>>>()?;

        with_cancellation(cancel, async {
            debug!(backend = BACKEND, count = envelopes.len(), "Recorded event batch");
            self.published.write().extend(envelopes);
            Ok(())
        })
        .await
    }

    async fn close(&self) -> CourierResult<()> {
        if self.lifecycle.begin_close() {
            debug!(backend = BACKEND, "Event bus closed");
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

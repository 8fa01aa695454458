//! Shared fakes and fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::events::{EventTypeRegistry, IntegrationEvent};
use courier_core::messaging::{BrokerTransport, TransportError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: u64,
    pub amount_cents: u64,
}

impl IntegrationEvent for OrderCreated {
    const EVENT_TYPE: &'static str = "OrderCreated";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: u64,
    pub carrier: String,
}

impl IntegrationEvent for OrderShipped {
    const EVENT_TYPE: &'static str = "OrderShipped";
}

pub fn order_created(order_id: u64) -> OrderCreated {
    OrderCreated {
        order_id,
        amount_cents: 1999,
    }
}

pub fn event_registry() -> EventTypeRegistry {
    EventTypeRegistry::new()
        .register::<OrderCreated>()
        .register::<OrderShipped>()
}

/// Broker transport fake: records what it is asked to send, fails the Nth
/// send attempt on request and counts every interaction.
#[derive(Debug)]
pub struct ScriptedTransport<M> {
    sent: Mutex<Vec<M>>,
    attempts: AtomicUsize,
    batch_calls: AtomicUsize,
    close_calls: AtomicUsize,
    fail_on_attempt: Option<(usize, TransportError)>,
    delay: Option<Duration>,
}

impl<M> Default for ScriptedTransport<M> {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_on_attempt: None,
            delay: None,
        }
    }
}

impl<M: Clone> ScriptedTransport<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `attempt`th send (1-based) with `error`
    pub fn failing_on(attempt: usize, error: TransportError) -> Self {
        Self {
            fail_on_attempt: Some((attempt, error)),
            ..Self::default()
        }
    }

    /// Every send waits this long before completing
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<M> {
        self.sent.lock().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Sends, batches and closes combined
    pub fn interactions(&self) -> usize {
        self.send_attempts() + self.batch_calls() + self.close_calls()
    }
}

#[async_trait]
impl<M> BrokerTransport for ScriptedTransport<M>
where
    M: Clone + Send + Sync + 'static,
{
    type Message = M;

    async fn send(&self, message: M) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((failing, error)) = &self.fail_on_attempt {
            if *failing == attempt {
                return Err(error.clone());
            }
        }
        self.sent.lock().push(message);
        Ok(())
    }

    async fn send_batch(&self, messages: Vec<M>) -> Result<(), TransportError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut first_error = None;
        for message in messages {
            if let Err(error) = self.send(message).await {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Idempotency store contract and record types.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CourierResult;

/// JSON snapshot of a successful operation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOutcome {
    pub payload: Value,
    pub completed_at: DateTime<Utc>,
}

impl CachedOutcome {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            completed_at: Utc::now(),
        }
    }

    /// Capture `value` as a snapshot
    pub fn capture<T: Serialize>(value: &T) -> CourierResult<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Rebuild the original value
    pub fn decode<T: DeserializeOwned>(&self) -> CourierResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// What the store holds for a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IdempotencyRecord {
    /// A caller is running the operation
    InFlight {
        claim_id: Uuid,
        claimed_at: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    },
    /// The operation succeeded with this outcome
    Completed(CachedOutcome),
}

impl IdempotencyRecord {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn outcome(&self) -> Option<&CachedOutcome> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            Self::InFlight { .. } => None,
        }
    }
}

/// Proof of holding the claim on a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimToken {
    key: String,
    claim_id: Uuid,
    lease_expires_at: DateTime<Utc>,
}

impl ClaimToken {
    pub fn new(key: impl Into<String>, lease_expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            claim_id: Uuid::new_v4(),
            lease_expires_at,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn claim_id(&self) -> Uuid {
        self.claim_id
    }

    pub fn lease_expires_at(&self) -> DateTime<Utc> {
        self.lease_expires_at
    }
}

/// Result of an atomic claim attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The caller now owns the key and must run the operation
    Claimed(ClaimToken),
    /// Another caller holds an unexpired claim
    InFlight { lease_expires_at: DateTime<Utc> },
    /// The operation already succeeded
    Completed(CachedOutcome),
}

/// Keyed storage for idempotency records.
///
/// `try_claim` must be atomic: of any number of concurrent callers for an
/// absent key, exactly one receives `Claimed`. A claim whose lease has expired
/// may be taken over by the next `try_claim`.
///
/// `complete` must be atomic as well: once a key holds a completed outcome,
/// that outcome is never replaced. The first completion wins, and later
/// completions for the same key get the stored outcome back.
///
/// Implementations report their own failures as
/// `CourierError::IdempotencyStore`.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> CourierResult<Option<IdempotencyRecord>>;

    /// Record a successful outcome for the caller holding `token`.
    ///
    /// Replaces any claim on the key. If the key is already completed the
    /// existing outcome is kept and returned; otherwise `outcome` is stored
    /// and returned.
    async fn complete(
        &self,
        key: &str,
        token: &ClaimToken,
        outcome: CachedOutcome,
    ) -> CourierResult<CachedOutcome>;

    /// Push the lease of the caller's claim `lease` into the future.
    ///
    /// Returns `false` when the claim is gone: taken over, completed or released.
    async fn renew(&self, key: &str, token: &ClaimToken, lease: Duration) -> CourierResult<bool>;

    /// Whether a completed outcome is cached for `key`
    async fn exists(&self, key: &str) -> CourierResult<bool>;

    /// Delete whatever is stored for `key`; returns whether anything was removed
    async fn remove(&self, key: &str) -> CourierResult<bool>;

    /// Insert an in-flight marker unless the key is already claimed or completed
    async fn try_claim(&self, key: &str, lease: Duration) -> CourierResult<ClaimOutcome>;

    /// Drop the caller's claim; a no-op if the claim was taken over or completed
    async fn release(&self, key: &str, token: &ClaimToken) -> CourierResult<()>;
}

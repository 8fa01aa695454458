//! # In-Memory Idempotency Store
//!
//! DashMap-backed store for tests and single-process deployments. Claims are
//! atomic per key through DashMap's entry API; no shard lock is held across
//! an await.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::store::{CachedOutcome, ClaimOutcome, ClaimToken, IdempotencyRecord, IdempotencyStore};
use crate::config::IdempotencyConfig;
use crate::error::{CourierError, CourierResult};

#[derive(Debug, Clone)]
struct StoredRecord {
    record: IdempotencyRecord,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Process-local [`IdempotencyStore`]
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<String, StoredRecord>,
    record_ttl: Option<Duration>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed records disappear `ttl` after they were stored
    pub fn with_record_ttl(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            record_ttl: Some(ttl),
        }
    }

    /// Store honoring `record_ttl_seconds`; records never expire when it is unset
    pub fn from_config(config: &IdempotencyConfig) -> Self {
        match config.record_ttl() {
            Some(ttl) => Self::with_record_ttl(ttl),
            None => Self::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop expired completed records
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, stored| !stored.is_expired(now));
        before.saturating_sub(self.records.len())
    }

    fn live_record(&self, key: &str, now: DateTime<Utc>) -> Option<IdempotencyRecord> {
        let stored = self.records.get(key)?;
        if stored.is_expired(now) {
            drop(stored);
            self.records.remove_if(key, |_, stored| stored.is_expired(now));
            return None;
        }
        Some(stored.record.clone())
    }
}

fn offset(operation: &str, from: DateTime<Utc>, by: Duration) -> CourierResult<DateTime<Utc>> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .ok_or_else(|| {
            CourierError::idempotency_store(operation, format!("duration {by:?} is out of range"))
        })
}

fn in_flight(token: &ClaimToken, claimed_at: DateTime<Utc>) -> StoredRecord {
    StoredRecord {
        record: IdempotencyRecord::InFlight {
            claim_id: token.claim_id(),
            claimed_at,
            lease_expires_at: token.lease_expires_at(),
        },
        expires_at: None,
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> CourierResult<Option<IdempotencyRecord>> {
        Ok(self.live_record(key, Utc::now()))
    }

    async fn complete(
        &self,
        key: &str,
        token: &ClaimToken,
        outcome: CachedOutcome,
    ) -> CourierResult<CachedOutcome> {
        let now = Utc::now();
        let expires_at = match self.record_ttl {
            Some(ttl) => Some(offset("complete", outcome.completed_at, ttl)?),
            None => None,
        };
        let completed = StoredRecord {
            record: IdempotencyRecord::Completed(outcome.clone()),
            expires_at,
        };

        match self.records.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(completed);
            }
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get();
                match &stored.record {
                    IdempotencyRecord::Completed(existing) if !stored.is_expired(now) => {
                        debug!(key, "Key already completed, keeping the stored outcome");
                        return Ok(existing.clone());
                    }
                    IdempotencyRecord::InFlight { claim_id, .. } if *claim_id != token.claim_id() => {
                        debug!(key, "Claim was taken over; first completion wins");
                    }
                    _ => {}
                }
                occupied.insert(completed);
            }
        }
        Ok(outcome)
    }

    async fn renew(&self, key: &str, token: &ClaimToken, lease: Duration) -> CourierResult<bool> {
        let renewed_until = offset("renew", Utc::now(), lease)?;
        let Some(mut stored) = self.records.get_mut(key) else {
            return Ok(false);
        };
        match &mut stored.record {
            IdempotencyRecord::InFlight {
                claim_id,
                lease_expires_at,
                ..
            } if *claim_id == token.claim_id() => {
                *lease_expires_at = renewed_until;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> CourierResult<bool> {
        Ok(self
            .live_record(key, Utc::now())
            .is_some_and(|record| record.is_completed()))
    }

    async fn remove(&self, key: &str) -> CourierResult<bool> {
        Ok(self.records.remove(key).is_some())
    }

    async fn try_claim(&self, key: &str, lease: Duration) -> CourierResult<ClaimOutcome> {
        let now = Utc::now();
        let token = ClaimToken::new(key, offset("try_claim", now, lease)?);

        match self.records.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(in_flight(&token, now));
                Ok(ClaimOutcome::Claimed(token))
            }
            Entry::Occupied(mut occupied) => {
                let current = {
                    let stored = occupied.get();
                    match &stored.record {
                        _ if stored.is_expired(now) => None,
                        IdempotencyRecord::Completed(outcome) => {
                            Some(ClaimOutcome::Completed(outcome.clone()))
                        }
                        IdempotencyRecord::InFlight {
                            lease_expires_at, ..
                        } if *lease_expires_at > now => Some(ClaimOutcome::InFlight {
                            lease_expires_at: *lease_expires_at,
                        }),
                        IdempotencyRecord::InFlight { .. } => None,
                    }
                };

                match current {
                    Some(outcome) => Ok(outcome),
                    None => {
                        occupied.insert(in_flight(&token, now));
                        Ok(ClaimOutcome::Claimed(token))
                    }
                }
            }
        }
    }

    async fn release(&self, key: &str, token: &ClaimToken) -> CourierResult<()> {
        self.records.remove_if(key, |_, stored| {
            matches!(
                stored.record,
                IdempotencyRecord::InFlight { claim_id, .. } if claim_id == token.claim_id()
            )
        });
        Ok(())
    }
}

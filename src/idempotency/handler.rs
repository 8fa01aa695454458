//! Claim-based idempotent execution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::store::{CachedOutcome, ClaimOutcome, ClaimToken, IdempotencyStore};
use crate::config::IdempotencyConfig;
use crate::error::{CourierError, CourierResult, ValidationErrors};

const MIN_RENEWAL_PERIOD: Duration = Duration::from_millis(1);

/// Claim lease and waiting behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyOptions {
    /// How long a claim protects a key. A live holder renews it every half
    /// lease; a holder that dies is replaced after this.
    pub lease: Duration,
    pub poll_interval: Duration,
    /// How long a caller waits for another caller's claim before giving up
    pub wait_timeout: Duration,
}

impl Default for IdempotencyOptions {
    fn default() -> Self {
        Self::from(&IdempotencyConfig::default())
    }
}

impl From<&IdempotencyConfig> for IdempotencyOptions {
    fn from(config: &IdempotencyConfig) -> Self {
        Self {
            lease: config.lease(),
            poll_interval: config.poll_interval(),
            wait_timeout: config.wait_timeout(),
        }
    }
}

/// Runs operations at most once per key.
///
/// The store is shared, not owned; several handlers may use the same store.
pub struct IdempotencyHandler<S: ?Sized = dyn IdempotencyStore> {
    store: Arc<S>,
    options: IdempotencyOptions,
}

impl<S: ?Sized> Clone for IdempotencyHandler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options: self.options,
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for IdempotencyHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyHandler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S> IdempotencyHandler<S>
where
    S: IdempotencyStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_options(store, IdempotencyOptions::default())
    }

    pub fn with_options(store: Arc<S>, options: IdempotencyOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> IdempotencyOptions {
        self.options
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Return the cached result for `key`, or run `operation` and cache its success.
    ///
    /// # Errors
    ///
    /// - the operation's own error (not cached; the claim is released)
    /// - `IdempotencyInFlight` when another caller still holds the key after
    ///   `wait_timeout`
    /// - `IdempotencyStore` when the store fails, including when caching the
    ///   outcome fails after the operation ran
    /// - `Serialization` when the value cannot be snapshotted or a cached
    ///   snapshot does not decode as `T`
    pub async fn handle<T, F, Fut>(&self, key: &str, operation: F) -> CourierResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CourierResult<T>>,
    {
        if key.trim().is_empty() {
            let mut errors = ValidationErrors::new();
            errors.add("idempotency_key", "required");
            return Err(CourierError::Validation(errors));
        }

        let deadline = Instant::now() + self.options.wait_timeout;
        loop {
            let claim = self
                .store
                .try_claim(key, self.options.lease)
                .await
                .map_err(|e| store_error("try_claim", e))?;

            match claim {
                ClaimOutcome::Completed(outcome) => {
                    debug!(key, "Idempotency cache hit");
                    return outcome.decode();
                }
                ClaimOutcome::Claimed(token) => {
                    debug!(key, "Idempotency key claimed");
                    return self.run_claimed(key, token, operation).await;
                }
                ClaimOutcome::InFlight { lease_expires_at } => {
                    if Instant::now() >= deadline {
                        warn!(key, %lease_expires_at, "Gave up waiting for in-flight idempotency key");
                        return Err(CourierError::IdempotencyInFlight {
                            key: key.to_string(),
                        });
                    }
                    debug!(key, %lease_expires_at, "Waiting for in-flight idempotency key");
                    tokio::time::sleep(self.options.poll_interval).await;
                }
            }
        }
    }

    async fn run_claimed<T, F, Fut>(
        &self,
        key: &str,
        token: ClaimToken,
        operation: F,
    ) -> CourierResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CourierResult<T>>,
    {
        let value = match self.run_with_renewals(key, &token, operation()).await {
            Ok(value) => value,
            Err(error) => {
                debug!(key, code = error.code(), "Operation failed, releasing idempotency key");
                self.release(key, &token).await;
                return Err(error);
            }
        };

        let outcome = match CachedOutcome::capture(&value) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.release(key, &token).await;
                return Err(error);
            }
        };

        let stored = self
            .store
            .complete(key, &token, outcome.clone())
            .await
            .map_err(|e| store_error("complete", e))?;
        if stored != outcome {
            warn!(key, "Another caller completed this key first, returning its outcome");
            return stored.decode();
        }
        debug!(key, "Idempotent outcome cached");
        Ok(value)
    }

    /// Drive `operation` while renewing the claim every half lease, so a slow
    /// holder keeps its key.
    async fn run_with_renewals<T, Fut>(
        &self,
        key: &str,
        token: &ClaimToken,
        operation: Fut,
    ) -> CourierResult<T>
    where
        Fut: Future<Output = CourierResult<T>>,
    {
        let period = (self.options.lease / 2).max(MIN_RENEWAL_PERIOD);
        let mut renewals = tokio::time::interval_at(Instant::now() + period, period);
        renewals.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(operation);

        loop {
            tokio::select! {
                result = &mut operation => return result,
                _ = renewals.tick() => {
                    match self.store.renew(key, token, self.options.lease).await {
                        Ok(true) => debug!(key, "Idempotency lease renewed"),
                        Ok(false) => warn!(key, "Idempotency claim lost while the operation was running"),
                        Err(error) => warn!(key, error = %error, "Failed to renew idempotency lease"),
                    }
                }
            }
        }
    }

    async fn release(&self, key: &str, token: &ClaimToken) {
        if let Err(error) = self.store.release(key, token).await {
            warn!(key, error = %error, "Failed to release idempotency claim; it expires with its lease");
        }
    }

    /// Whether a successful outcome is cached for `key`
    pub async fn is_processed(&self, key: &str) -> CourierResult<bool> {
        self.store
            .exists(key)
            .await
            .map_err(|e| store_error("exists", e))
    }

    /// Forget `key`, so the next call runs the operation again
    pub async fn remove(&self, key: &str) -> CourierResult<bool> {
        self.store
            .remove(key)
            .await
            .map_err(|e| store_error("remove", e))
    }
}

fn store_error(operation: &str, error: CourierError) -> CourierError {
    match error {
        CourierError::IdempotencyStore { .. } => error,
        other => CourierError::idempotency_store(operation, other.to_string()),
    }
}

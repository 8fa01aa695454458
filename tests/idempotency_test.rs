//! Idempotent execution against the in-memory store and a failing store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::idempotency::{
    CachedOutcome, ClaimOutcome, ClaimToken, IdempotencyHandler, IdempotencyOptions,
    IdempotencyRecord, IdempotencyStore, InMemoryIdempotencyStore,
};
use courier_core::{CourierError, CourierResult};
use serde::{Deserialize, Serialize};

fn options() -> IdempotencyOptions {
    IdempotencyOptions {
        lease: Duration::from_secs(30),
        poll_interval: Duration::from_millis(5),
        wait_timeout: Duration::from_secs(5),
    }
}

fn handler() -> IdempotencyHandler<InMemoryIdempotencyStore> {
    IdempotencyHandler::with_options(Arc::new(InMemoryIdempotencyStore::new()), options())
}

#[tokio::test]
async fn test_second_call_returns_cached_value() {
    let handler = handler();
    let counter = AtomicUsize::new(0);

    let first = handler
        .handle("k1", || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        })
        .await
        .unwrap();
    let second = handler
        .handle("k1", || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        })
        .await
        .unwrap();

    assert_eq!((first, second), (42, 42));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(handler.is_processed("k1").await.unwrap());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Receipt {
    payment_id: String,
    amount_cents: u64,
}

#[tokio::test]
async fn test_cached_struct_decodes_equal() {
    let handler = handler();
    let receipt = Receipt {
        payment_id: "pay_123".to_string(),
        amount_cents: 2500,
    };

    let first = handler
        .handle("payment:pay_123", || async { Ok(receipt.clone()) })
        .await
        .unwrap();
    let second: Receipt = handler
        .handle("payment:pay_123", || async {
            Err(CourierError::failure("UNREACHABLE", "operation must not run again"))
        })
        .await
        .unwrap();

    assert_eq!(first, receipt);
    assert_eq!(second, receipt);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_execution() {
    let handler = handler();
    let counter = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let handler = handler.clone();
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                handler
                    .handle("shared-key", || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42u32)
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 42);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_keys_run_independently() {
    let handler = handler();
    let counter = AtomicUsize::new(0);

    for key in ["order:1", "order:2", "order:3"] {
        handler
            .handle(key, || async {
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            })
            .await
            .unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failure_allows_retry() {
    let handler = handler();
    let attempts = AtomicUsize::new(0);

    let failed = handler
        .handle("retry-key", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(CourierError::failure("UPSTREAM_DOWN", "payment gateway unavailable"))
        })
        .await
        .unwrap_err();
    assert_eq!(failed.code(), "UPSTREAM_DOWN");
    assert!(!handler.is_processed("retry-key").await.unwrap());

    let value = handler
        .handle("retry-key", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(7u32)
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_remove_allows_reexecution() {
    let handler = handler();
    let counter = AtomicUsize::new(0);
    let run = || async {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(1u8)
    };

    handler.handle("k", run).await.unwrap();
    assert!(handler.remove("k").await.unwrap());
    assert!(!handler.is_processed("k").await.unwrap());
    assert!(!handler.remove("k").await.unwrap());

    handler.handle("k", run).await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_blank_key_is_validation_error() {
    let error = handler()
        .handle("  ", || async { Ok(1u8) })
        .await
        .unwrap_err();

    assert!(error.is_validation());
    assert!(error.validation_errors().unwrap().field("idempotency_key").is_some());
}

#[tokio::test]
async fn test_handlers_over_shared_store_see_each_other() {
    let store: Arc<dyn IdempotencyStore> = Arc::new(InMemoryIdempotencyStore::new());
    let first = IdempotencyHandler::with_options(Arc::clone(&store), options());
    let second = IdempotencyHandler::with_options(store, options());

    first.handle("k", || async { Ok("done".to_string()) }).await.unwrap();
    let cached: String = second
        .handle("k", || async { Ok("again".to_string()) })
        .await
        .unwrap();

    assert_eq!(cached, "done");
}

/// Store whose every operation fails, as an unreachable backend would
struct UnavailableStore;

fn unavailable() -> CourierError {
    CourierError::BrokerConnection {
        backend: "redis".to_string(),
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl IdempotencyStore for UnavailableStore {
    async fn get(&self, _key: &str) -> CourierResult<Option<IdempotencyRecord>> {
        Err(unavailable())
    }

    async fn complete(
        &self,
        _key: &str,
        _token: &ClaimToken,
        _outcome: CachedOutcome,
    ) -> CourierResult<CachedOutcome> {
        Err(unavailable())
    }

    async fn renew(&self, _key: &str, _token: &ClaimToken, _lease: Duration) -> CourierResult<bool> {
        Err(unavailable())
    }

    async fn exists(&self, _key: &str) -> CourierResult<bool> {
        Err(unavailable())
    }

    async fn remove(&self, _key: &str) -> CourierResult<bool> {
        Err(unavailable())
    }

    async fn try_claim(&self, _key: &str, _lease: Duration) -> CourierResult<ClaimOutcome> {
        Err(unavailable())
    }

    async fn release(&self, _key: &str, _token: &ClaimToken) -> CourierResult<()> {
        Err(unavailable())
    }
}

#[tokio::test]
async fn test_store_failure_surfaces_without_running_operation() {
    let handler = IdempotencyHandler::new(Arc::new(UnavailableStore));
    let counter = AtomicUsize::new(0);

    let error = handler
        .handle("k", || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1u8)
        })
        .await
        .unwrap_err();

    assert_eq!(error.code(), "IDEMPOTENCY_STORE_ERROR");
    assert!(error.to_string().contains("connection refused"));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    assert_eq!(
        handler.is_processed("k").await.unwrap_err().code(),
        "IDEMPOTENCY_STORE_ERROR"
    );
}

#[tokio::test]
async fn test_in_flight_claim_times_out_waiter() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let claim = store.try_claim("held", Duration::from_secs(60)).await.unwrap();
    assert!(matches!(claim, ClaimOutcome::Claimed(_)));

    let handler = IdempotencyHandler::with_options(
        store,
        IdempotencyOptions {
            wait_timeout: Duration::from_millis(30),
            ..options()
        },
    );
    let error = handler
        .handle("held", || async { Ok(1u8) })
        .await
        .unwrap_err();

    assert_eq!(error.code(), "IDEMPOTENCY_IN_FLIGHT");
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() {
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let claim = store.try_claim("abandoned", Duration::from_millis(10)).await.unwrap();
    assert!(matches!(claim, ClaimOutcome::Claimed(_)));
    tokio::time::sleep(Duration::from_millis(30)).await;

    let value = IdempotencyHandler::with_options(store, options())
        .handle("abandoned", || async { Ok(5u8) })
        .await
        .unwrap();

    assert_eq!(value, 5);
}

#[tokio::test]
async fn test_slow_holder_keeps_claim_past_lease() {
    let handler = IdempotencyHandler::with_options(
        Arc::new(InMemoryIdempotencyStore::new()),
        IdempotencyOptions {
            lease: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_secs(5),
        },
    );
    let runs = Arc::new(AtomicUsize::new(0));

    let slow = {
        let handler = handler.clone();
        let runs = Arc::clone(&runs);
        tokio::spawn(async move {
            handler
                .handle("slow-key", || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(1u32)
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let late = {
        let handler = handler.clone();
        let runs = Arc::clone(&runs);
        tokio::spawn(async move {
            handler
                .handle("slow-key", || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(2u32)
                })
                .await
        })
    };

    assert_eq!(slow.await.unwrap().unwrap(), 1);
    assert_eq!(late.await.unwrap().unwrap(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let cached: u32 = handler
        .handle("slow-key", || async { Ok(3u32) })
        .await
        .unwrap();
    assert_eq!(cached, 1);
}

/// Store whose leases cannot be renewed, so a slow holder is always taken over
struct NoRenewStore(InMemoryIdempotencyStore);

#[async_trait]
impl IdempotencyStore for NoRenewStore {
    async fn get(&self, key: &str) -> CourierResult<Option<IdempotencyRecord>> {
        self.0.get(key).await
    }

    async fn complete(
        &self,
        key: &str,
        token: &ClaimToken,
        outcome: CachedOutcome,
    ) -> CourierResult<CachedOutcome> {
        self.0.complete(key, token, outcome).await
    }

    async fn renew(&self, _key: &str, _token: &ClaimToken, _lease: Duration) -> CourierResult<bool> {
        Ok(false)
    }

    async fn exists(&self, key: &str) -> CourierResult<bool> {
        self.0.exists(key).await
    }

    async fn remove(&self, key: &str) -> CourierResult<bool> {
        self.0.remove(key).await
    }

    async fn try_claim(&self, key: &str, lease: Duration) -> CourierResult<ClaimOutcome> {
        self.0.try_claim(key, lease).await
    }

    async fn release(&self, key: &str, token: &ClaimToken) -> CourierResult<()> {
        self.0.release(key, token).await
    }
}

#[tokio::test]
async fn test_taken_over_key_keeps_first_outcome() {
    let handler = IdempotencyHandler::with_options(
        Arc::new(NoRenewStore(InMemoryIdempotencyStore::new())),
        IdempotencyOptions {
            lease: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            wait_timeout: Duration::from_secs(5),
        },
    );

    let first = {
        let handler = handler.clone();
        tokio::spawn(async move {
            handler
                .handle("contested", || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(1u32)
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = {
        let handler = handler.clone();
        tokio::spawn(async move {
            handler
                .handle("contested", || async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok(2u32)
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    let early: u32 = handler
        .handle("contested", || async { Ok(9u32) })
        .await
        .unwrap();

    assert_eq!(first.await.unwrap().unwrap(), 1);
    assert_eq!(second.await.unwrap().unwrap(), 1);
    let late: u32 = handler
        .handle("contested", || async { Ok(9u32) })
        .await
        .unwrap();
    assert_eq!((early, late), (1, 1));
}

#[tokio::test]
async fn test_store_from_config_applies_record_ttl() {
    let config = courier_core::config::IdempotencyConfig {
        record_ttl_seconds: Some(1),
        ..Default::default()
    };
    let handler = IdempotencyHandler::with_options(
        Arc::new(InMemoryIdempotencyStore::from_config(&config)),
        IdempotencyOptions::from(&config),
    );

    handler.handle("ttl-key", || async { Ok(1u8) }).await.unwrap();
    assert!(handler.is_processed("ttl-key").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!handler.is_processed("ttl-key").await.unwrap());
}

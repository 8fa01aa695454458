//! # Idempotent Execution
//!
//! [`IdempotencyHandler`] runs an operation at most once per caller-chosen
//! key. The first caller atomically claims the key in an
//! [`IdempotencyStore`]; concurrent callers with the same key wait for the
//! claim holder's result instead of running the operation again.
//!
//! Only successful outcomes are cached. A failed operation releases its claim
//! and the next call with that key runs it again.
//!
//! A claim is a lease. The holder renews it while the operation runs; a lease
//! that lapses (the holder crashed) lets another caller take the key over. If
//! both then finish, the first completion stored wins and the later caller
//! gets that outcome back.
//!
//! ```rust
//! use std::sync::Arc;
//! use courier_core::idempotency::{IdempotencyHandler, InMemoryIdempotencyStore};
//!
//! # async fn example() -> courier_core::CourierResult<()> {
//! let handler = IdempotencyHandler::new(Arc::new(InMemoryIdempotencyStore::new()));
//!
//! let first: u32 = handler.handle("order-7", || async { Ok(42) }).await?;
//! let second: u32 = handler.handle("order-7", || async { Ok(0) }).await?;
//! assert_eq!((first, second), (42, 42));
//! # Ok(())
//! # }
//! ```

pub mod handler;
pub mod in_memory;
pub mod store;

pub use handler::{IdempotencyHandler, IdempotencyOptions};
pub use in_memory::InMemoryIdempotencyStore;
pub use store::{CachedOutcome, ClaimOutcome, ClaimToken, IdempotencyRecord, IdempotencyStore};

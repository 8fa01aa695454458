//! # Request Dispatch
//!
//! Routes typed requests through a fixed pipeline to exactly one handler.
//!
//! ```text
//! Dispatcher::send(request)
//!   └─ TracingBehavior      (span + timing, optional)
//!       └─ ValidationBehavior (short-circuits on failures, optional)
//!           └─ custom behaviors, in registration order
//!               └─ RequestHandler
//! ```
//!
//! The registry is built once at startup and is read-only afterwards, so a
//! [`Dispatcher`] can be cloned freely across tasks.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use courier_core::dispatch::{Dispatcher, HandlerRegistry, Request, RequestHandler};
//! use courier_core::CourierResult;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Ping(u32);
//!
//! impl Request for Ping {
//!     type Response = CourierResult<u32>;
//! }
//!
//! struct PingHandler;
//!
//! #[async_trait]
//! impl RequestHandler<Ping> for PingHandler {
//!     async fn handle(&self, request: Ping, _cancel: &CancellationToken) -> CourierResult<CourierResult<u32>> {
//!         Ok(Ok(request.0 + 1))
//!     }
//! }
//!
//! # async fn example() -> CourierResult<()> {
//! let registry = HandlerRegistry::builder().handler::<Ping, _>(PingHandler).build()?;
//! let dispatcher = Dispatcher::new(registry);
//!
//! let pong = dispatcher.send(Ping(41), &CancellationToken::new()).await?;
//! assert_eq!(pong, Ok(42));
//! # Ok(())
//! # }
//! ```

pub mod behaviors;
pub mod dispatcher;
pub mod pipeline;
pub mod registry;
pub mod request;

pub use dispatcher::Dispatcher;
pub use pipeline::{Next, PipelineBehavior};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use request::{Request, RequestHandler, Response};

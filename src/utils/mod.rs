//! Small shared helpers.

pub mod cancellation;

pub use cancellation::with_cancellation;

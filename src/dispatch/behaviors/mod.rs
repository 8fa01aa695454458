//! Built-in pipeline behaviors.

pub mod tracing;
pub mod validation;

pub use self::tracing::TracingBehavior;
pub use self::validation::ValidationBehavior;

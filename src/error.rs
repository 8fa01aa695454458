//! # Error Types
//!
//! Structured error handling for the courier core. Every failure that crosses
//! a public boundary is a [`CourierError`], which carries a stable machine
//! readable code (see [`CourierError::code`]) and a human message (its
//! `Display` output).

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Stable error codes exposed through [`CourierError::code`]
pub mod codes {
    pub const CONFIGURATION: &str = "CONFIGURATION_ERROR";
    pub const VALIDATION: &str = "VALIDATION_ERROR";
    pub const BROKER_CONNECTION: &str = "BROKER_CONNECTION_ERROR";
    pub const BROKER_PUBLISH: &str = "BROKER_PUBLISH_ERROR";
    pub const SERIALIZATION: &str = "SERIALIZATION_ERROR";
    pub const IDEMPOTENCY_STORE: &str = "IDEMPOTENCY_STORE_ERROR";
    pub const IDEMPOTENCY_IN_FLIGHT: &str = "IDEMPOTENCY_IN_FLIGHT";
    pub const CANCELLED: &str = "CANCELLED";
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CourierError {
    /// Wiring defect, e.g. no handler registered for a request type
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// The adapter has no usable connection
    #[error("Broker connection error ({backend}): {message}")]
    BrokerConnection { backend: String, message: String },

    /// The broker rejected or timed out a specific send
    #[error("Broker publish error ({backend}) to '{destination}': {diagnostic}")]
    BrokerPublish {
        backend: String,
        destination: String,
        diagnostic: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Idempotency store error: {operation}: {message}")]
    IdempotencyStore { operation: String, message: String },

    #[error("Idempotency key '{key}' is still being processed by another caller")]
    IdempotencyInFlight { key: String },

    #[error("Operation cancelled")]
    Cancelled,

    /// Business failure produced by a handler
    #[error("{message}")]
    Failure { code: String, message: String },
}

impl CourierError {
    /// Stable code identifying the kind of failure
    pub fn code(&self) -> &str {
        match self {
            Self::Configuration(_) => codes::CONFIGURATION,
            Self::Validation(_) => codes::VALIDATION,
            Self::BrokerConnection { .. } => codes::BROKER_CONNECTION,
            Self::BrokerPublish { .. } => codes::BROKER_PUBLISH,
            Self::Serialization(_) => codes::SERIALIZATION,
            Self::IdempotencyStore { .. } => codes::IDEMPOTENCY_STORE,
            Self::IdempotencyInFlight { .. } => codes::IDEMPOTENCY_IN_FLIGHT,
            Self::Cancelled => codes::CANCELLED,
            Self::Failure { code, .. } => code.as_str(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn handler_not_registered(request_name: &str) -> Self {
        Self::Configuration(format!(
            "no handler registered for request type '{request_name}'"
        ))
    }

    pub fn broker_connection(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BrokerConnection {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn broker_publish(
        backend: impl Into<String>,
        destination: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self::BrokerPublish {
            backend: backend.into(),
            destination: destination.into(),
            diagnostic: diagnostic.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn idempotency_store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IdempotencyStore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a business failure with a caller-chosen code
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Per-field messages when this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(error: serde_json::Error) -> Self {
        CourierError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for CourierError {
    fn from(error: config::ConfigError) -> Self {
        CourierError::Configuration(error.to_string())
    }
}

impl From<validator::ValidationErrors> for CourierError {
    fn from(error: validator::ValidationErrors) -> Self {
        CourierError::Configuration(format!("invalid configuration: {error}"))
    }
}

pub type CourierResult<T = ()> = Result<T, CourierError>;

/// Field-level rule violations grouped by the field they concern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields with at least one violation
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

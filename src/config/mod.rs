//! # Courier Configuration
//!
//! Typed configuration deserialized with `serde` and checked with
//! `validator`. Values come from an optional TOML file, then `COURIER_`
//! environment variables (`__` separates nesting levels), see [`ConfigLoader`].
//!
//! ## Usage
//!
//! ```rust
//! use courier_core::config::{BrokerBackend, ConfigLoader};
//!
//! # fn main() -> Result<(), courier_core::CourierError> {
//! let config = ConfigLoader::new().load_str(
//!     r#"
//!     environment = "test"
//!
//!     [broker]
//!     backend = "rabbitmq"
//!
//!     [broker.rabbitmq]
//!     exchange = "orders.events"
//!     "#,
//! )?;
//!
//! assert_eq!(config.broker.backend, BrokerBackend::Rabbitmq);
//! assert_eq!(config.broker.rabbitmq.unwrap().exchange, "orders.events");
//! # Ok(())
//! # }
//! ```

pub mod brokers;
pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::defaults;
use crate::error::CourierResult;

pub use brokers::{
    BrokerBackend, BrokerSettings, KafkaCompression, KafkaConfig, RabbitmqConfig,
    ServiceBusConfig,
};
pub use loader::{ConfigLoader, CONFIG_PATH_ENV, ENV_PREFIX};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "snake_case")]
pub struct CourierConfig {
    /// Deployment environment name (development, test, production)
    #[validate(length(min = 1))]
    pub environment: String,

    #[validate(nested)]
    pub broker: BrokerSettings,

    #[validate(nested)]
    pub idempotency: IdempotencyConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            broker: BrokerSettings::default(),
            idempotency: IdempotencyConfig::default(),
        }
    }
}

impl CourierConfig {
    /// Field rules plus the cross-field rule that the selected broker has a section
    pub fn check(&self) -> CourierResult<()> {
        self.validate()?;
        self.broker.ensure_backend_section()
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Idempotency handler timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "snake_case")]
pub struct IdempotencyConfig {
    /// How long a claim protects a key before another caller may take it over
    #[validate(range(min = 1, max = 86400))]
    pub lease_seconds: u64,

    /// How often a waiting caller re-reads the record
    #[validate(range(min = 1, max = 60000))]
    pub poll_interval_ms: u64,

    /// How long a waiting caller waits for the claim holder
    #[validate(range(min = 1, max = 86400))]
    pub wait_timeout_seconds: u64,

    /// Expire completed records after this many seconds (never when unset)
    #[validate(range(min = 1))]
    pub record_ttl_seconds: Option<u64>,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            lease_seconds: defaults::IDEMPOTENCY_LEASE_SECONDS,
            poll_interval_ms: defaults::IDEMPOTENCY_POLL_INTERVAL_MS,
            wait_timeout_seconds: defaults::IDEMPOTENCY_WAIT_TIMEOUT_SECONDS,
            record_ttl_seconds: None,
        }
    }
}

impl IdempotencyConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }

    pub fn record_ttl(&self) -> Option<Duration> {
        self.record_ttl_seconds.map(Duration::from_secs)
    }
}

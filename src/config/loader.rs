//! Configuration Loader
//!
//! Layers an optional TOML file and environment overrides with the `config`
//! crate, deserializes into [`CourierConfig`] and validates the result.
//!
//! Environment keys use the prefix followed by `_`, with `__` between nesting
//! levels: `COURIER_BROKER__KAFKA__BOOTSTRAP_SERVERS=kafka:9092` sets
//! `broker.kafka.bootstrap_servers`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::CourierConfig;
use crate::error::{CourierError, CourierResult};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "COURIER";

/// Environment variable naming the TOML file read by [`ConfigLoader::load_from_env`]
pub const CONFIG_PATH_ENV: &str = "COURIER_CONFIG_PATH";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_env_prefix(ENV_PREFIX)
    }

    /// Read overrides from `{prefix}_...` variables instead of `COURIER_...`
    pub fn with_env_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: prefix.into(),
        }
    }

    /// Load from `path` when given, then apply environment overrides
    pub fn load(&self, path: Option<&Path>) -> CourierResult<CourierConfig> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(CourierError::configuration(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config = builder.add_source(self.environment()).build()?;
        let config = self.finish(config)?;

        info!(
            environment = %config.environment,
            backend = %config.broker.backend,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load from the file named by `COURIER_CONFIG_PATH`, or from the environment alone
    pub fn load_from_env(&self) -> CourierResult<CourierConfig> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => self.load(Some(&PathBuf::from(path))),
            _ => self.load(None),
        }
    }

    /// Load from TOML text, then apply environment overrides
    pub fn load_str(&self, toml: &str) -> CourierResult<CourierConfig> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(self.environment())
            .build()?;
        self.finish(config)
    }

    fn environment(&self) -> Environment {
        Environment::with_prefix(&self.env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(&self, config: Config) -> CourierResult<CourierConfig> {
        let config: CourierConfig = config.try_deserialize()?;
        config.check()?;
        Ok(config)
    }
}

//! Layered settings: defaults, config file, environment, then CLI flags

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::detector::RegressionConfig;
use crate::emitter::EmitConfig;
use crate::error::ConfigError;
use crate::history::wire::DEFAULT_GLOBAL_NAME;
use crate::retry::RetryPolicy;

/// Environment variable prefix (`BENCHTRAIL__REGRESSION__THRESHOLD=3`)
pub const ENV_PREFIX: &str = "BENCHTRAIL";

/// Where and how the history document is kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Global bound by the script prefix (`window.<name> = `)
    pub global_name: String,
    /// Keep only the newest runs per suite
    pub max_items: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            global_name: DEFAULT_GLOBAL_NAME.to_string(),
            max_items: None,
        }
    }
}

/// Every tunable of one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub regression: RegressionConfig,
    pub emit: EmitConfig,
    pub retry: RetryPolicy,
    pub store: StoreConfig,
}

impl Settings {
    /// Load defaults, then `path` (if any), then `BENCHTRAIL__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            // Format follows the extension (toml, yaml, json)
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let regression = &self.regression;
        if !(regression.threshold > 0.0) || !regression.threshold.is_finite() {
            return Err(ConfigError::invalid(
                "regression.threshold",
                format!("must be a positive number, got {}", regression.threshold),
            ));
        }
        if regression.window_size == 0 {
            return Err(ConfigError::invalid(
                "regression.window_size",
                "must be greater than 0",
            ));
        }
        if !(regression.epsilon >= 0.0) {
            return Err(ConfigError::invalid(
                "regression.epsilon",
                format!("must not be negative, got {}", regression.epsilon),
            ));
        }
        if !(regression.relative_floor >= 0.0) {
            return Err(ConfigError::invalid(
                "regression.relative_floor",
                format!("must not be negative, got {}", regression.relative_floor),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                "must be greater than 0",
            ));
        }
        if !(self.retry.backoff_factor >= 1.0) {
            return Err(ConfigError::invalid(
                "retry.backoff_factor",
                format!("must be at least 1.0, got {}", self.retry.backoff_factor),
            ));
        }
        if self.store.global_name.is_empty()
            || !self
                .store
                .global_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return Err(ConfigError::invalid(
                "store.global_name",
                format!("'{}' is not a valid identifier", self.store.global_name),
            ));
        }
        if self.store.max_items == Some(0) {
            return Err(ConfigError::invalid(
                "store.max_items",
                "must be greater than 0 when set",
            ));
        }
        Ok(())
    }
}

//! Configuration for the lottery demo.
//!
//! Loads configuration from environment variables with sensible defaults. A
//! variable that is set but cannot be parsed is an error rather than silently
//! falling back to the default.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use waitlist_lottery_runtime::CoordinatorConfig;
use waitlist_lottery_runtime::retry::RetryPolicy;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set to a value that does not parse
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Environment variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Demo configuration loaded from `LOTTERY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log filter directive (`LOTTERY_LOG_LEVEL`, default `info`)
    pub log_level: String,
    /// Seed for reproducible draws (`LOTTERY_SEED`, default: thread RNG)
    pub seed: Option<u64>,
    /// Write attempts per action on version conflicts (`LOTTERY_PERSIST_MAX_ATTEMPTS`, default 3)
    pub persist_max_attempts: usize,
    /// Retries for transient notification failures (`LOTTERY_NOTIFY_MAX_RETRIES`, default 0)
    pub notify_max_retries: usize,
    /// First retry delay in milliseconds (`LOTTERY_NOTIFY_INITIAL_DELAY_MS`, default 100)
    pub notify_initial_delay_ms: u64,
    /// Install the Prometheus recorder and print metrics at exit (`LOTTERY_METRICS_ENABLED`, default true)
    pub metrics_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            seed: None,
            persist_max_attempts: 3,
            notify_max_retries: 0,
            notify_initial_delay_ms: 100,
            metrics_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` (the environment in production,
    /// a map in tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            log_level: lookup("LOTTERY_LOG_LEVEL").unwrap_or(defaults.log_level),
            seed: parse_optional(&lookup, "LOTTERY_SEED")?,
            persist_max_attempts: parse_optional(&lookup, "LOTTERY_PERSIST_MAX_ATTEMPTS")?
                .unwrap_or(defaults.persist_max_attempts),
            notify_max_retries: parse_optional(&lookup, "LOTTERY_NOTIFY_MAX_RETRIES")?
                .unwrap_or(defaults.notify_max_retries),
            notify_initial_delay_ms: parse_optional(&lookup, "LOTTERY_NOTIFY_INITIAL_DELAY_MS")?
                .unwrap_or(defaults.notify_initial_delay_ms),
            metrics_enabled: parse_optional(&lookup, "LOTTERY_METRICS_ENABLED")?
                .unwrap_or(defaults.metrics_enabled),
        })
    }

    /// Coordinator settings derived from this configuration
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(
            self.persist_max_attempts,
            RetryPolicy::builder()
                .max_retries(self.notify_max_retries)
                .initial_delay(Duration::from_millis(self.notify_initial_delay_ms))
                .build(),
        )
    }
}

fn parse_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

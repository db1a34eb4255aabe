//! Client configuration.
//!
//! Configuration comes from the environment with validation and sensible
//! defaults for every value.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `SHARED_TODOS_APP_ID` | remote application id | `local` |
//! | `SHARED_TODOS_RETRY_INITIAL_MS` | first reconnect delay | `250` |
//! | `SHARED_TODOS_RETRY_MAX_MS` | reconnect delay cap | `30000` |
//! | `SHARED_TODOS_RETRY_MULTIPLIER` | backoff multiplier | `2.0` |
//! | `SHARED_TODOS_MUTATION_TIMEOUT_MS` | wait for a mutation outcome | `10000` |
//! | `SHARED_TODOS_SHUTDOWN_TIMEOUT_MS` | shutdown grace period | `5000` |
//! | `SHARED_TODOS_METRICS_ADDR` | Prometheus listen address | unset |
//!
//! # Example
//!
//! ```no_run
//! use shared_todos_runtime::config::ClientConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! println!("App: {}", config.app_id);
//! # Ok(())
//! # }
//! ```

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable names
pub mod vars {
    /// Remote application id
    pub const APP_ID: &str = "SHARED_TODOS_APP_ID";
    /// First reconnect delay, in milliseconds
    pub const RETRY_INITIAL_MS: &str = "SHARED_TODOS_RETRY_INITIAL_MS";
    /// Reconnect delay cap, in milliseconds
    pub const RETRY_MAX_MS: &str = "SHARED_TODOS_RETRY_MAX_MS";
    /// Backoff multiplier
    pub const RETRY_MULTIPLIER: &str = "SHARED_TODOS_RETRY_MULTIPLIER";
    /// Mutation outcome timeout, in milliseconds
    pub const MUTATION_TIMEOUT_MS: &str = "SHARED_TODOS_MUTATION_TIMEOUT_MS";
    /// Shutdown grace period, in milliseconds
    pub const SHUTDOWN_TIMEOUT_MS: &str = "SHARED_TODOS_SHUTDOWN_TIMEOUT_MS";
    /// Prometheus listen address
    pub const METRICS_ADDR: &str = "SHARED_TODOS_METRICS_ADDR";
}

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Parse {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Configuration for a [`TodoClient`](crate::TodoClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote application id
    pub app_id: String,
    /// First reconnect delay
    pub retry_initial_delay: Duration,
    /// Reconnect delay cap
    pub retry_max_delay: Duration,
    /// Backoff multiplier
    pub retry_multiplier: f64,
    /// How long an intent waits for its outcome
    pub mutation_timeout: Duration,
    /// Grace period for in-flight writes on shutdown
    pub shutdown_timeout: Duration,
    /// Prometheus listen address, if metrics should be exported
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_id: "local".to_string(),
            retry_initial_delay: Duration::from_millis(250),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
            mutation_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            metrics_addr: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with defaults for `app_id`
    #[must_use]
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    /// Load configuration from process environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through a variable lookup function
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            app_id: lookup(vars::APP_ID).unwrap_or(defaults.app_id),
            retry_initial_delay: parse_millis(&lookup, vars::RETRY_INITIAL_MS)?
                .unwrap_or(defaults.retry_initial_delay),
            retry_max_delay: parse_millis(&lookup, vars::RETRY_MAX_MS)?
                .unwrap_or(defaults.retry_max_delay),
            retry_multiplier: parse(&lookup, vars::RETRY_MULTIPLIER)?
                .unwrap_or(defaults.retry_multiplier),
            mutation_timeout: parse_millis(&lookup, vars::MUTATION_TIMEOUT_MS)?
                .unwrap_or(defaults.mutation_timeout),
            shutdown_timeout: parse_millis(&lookup, vars::SHUTDOWN_TIMEOUT_MS)?
                .unwrap_or(defaults.shutdown_timeout),
            metrics_addr: parse(&lookup, vars::METRICS_ADDR)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Set the first reconnect delay
    #[must_use]
    pub const fn with_retry_initial_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay = delay;
        self
    }

    /// Set the reconnect delay cap
    #[must_use]
    pub const fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    #[must_use]
    pub const fn with_retry_multiplier(mut self, multiplier: f64) -> Self {
        self.retry_multiplier = multiplier;
        self
    }

    /// Set the mutation outcome timeout
    #[must_use]
    pub const fn with_mutation_timeout(mut self, timeout: Duration) -> Self {
        self.mutation_timeout = timeout;
        self
    }

    /// Set the shutdown grace period
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Export metrics on `addr`
    #[must_use]
    pub const fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Validation("app_id cannot be empty".to_string()));
        }
        if !(self.retry_multiplier >= 1.0 && self.retry_multiplier.is_finite()) {
            return Err(ConfigError::Validation(format!(
                "retry_multiplier must be a finite number >= 1.0, got {}",
                self.retry_multiplier
            )));
        }
        if self.retry_initial_delay > self.retry_max_delay {
            return Err(ConfigError::Validation(format!(
                "retry_initial_delay ({:?}) exceeds retry_max_delay ({:?})",
                self.retry_initial_delay, self.retry_max_delay
            )));
        }
        if self.mutation_timeout.is_zero() {
            return Err(ConfigError::Validation("mutation_timeout must be > 0".to_string()));
        }
        Ok(())
    }

    /// Reconnect policy for the live subscription
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .initial_delay(self.retry_initial_delay)
            .max_delay(self.retry_max_delay)
            .multiplier(self.retry_multiplier)
            .build()
    }
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(var)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
                var,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn parse_millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<F, u64>(lookup, var)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.app_id, "local");
        assert_eq!(config.retry_initial_delay, Duration::from_millis(250));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_reads_every_variable() {
        let config = ClientConfig::from_lookup(lookup(&[
            (vars::APP_ID, "todos-prod"),
            (vars::RETRY_INITIAL_MS, "100"),
            (vars::RETRY_MAX_MS, "2000"),
            (vars::RETRY_MULTIPLIER, "3.0"),
            (vars::MUTATION_TIMEOUT_MS, "1500"),
            (vars::SHUTDOWN_TIMEOUT_MS, "750"),
            (vars::METRICS_ADDR, "127.0.0.1:9090"),
        ]))
        .unwrap();

        assert_eq!(config.app_id, "todos-prod");
        assert_eq!(config.retry_initial_delay, Duration::from_millis(100));
        assert_eq!(config.retry_max_delay, Duration::from_secs(2));
        assert!((config.retry_multiplier - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.mutation_timeout, Duration::from_millis(1500));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(750));
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9090".parse().unwrap()));
    }

    #[test]
    fn test_unparsable_value_names_the_variable() {
        let err = ClientConfig::from_lookup(lookup(&[(vars::RETRY_MAX_MS, "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse { var: vars::RETRY_MAX_MS, ref value, .. } if value == "soon"
        ));
    }

    #[test]
    fn test_validation_rules() {
        let shrinking = ClientConfig::default().with_retry_multiplier(0.5);
        assert!(matches!(shrinking.validate(), Err(ConfigError::Validation(_))));

        let inverted = ClientConfig::default()
            .with_retry_initial_delay(Duration::from_secs(10))
            .with_retry_max_delay(Duration::from_secs(1));
        assert!(inverted.validate().is_err());

        assert!(ClientConfig::new("  ").validate().is_err());
        assert!(
            ClientConfig::from_lookup(lookup(&[(vars::APP_ID, "")])).is_err()
        );
    }

    #[test]
    fn test_retry_policy_mirrors_config() {
        let policy = ClientConfig::default()
            .with_retry_initial_delay(Duration::from_millis(10))
            .with_retry_max_delay(Duration::from_millis(40))
            .retry_policy();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(40));
        assert!(policy.jitter);
        assert!(policy.max_retries.is_none());
    }
}

//! Batch run configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults
//! (per command), `GEOBATCH_*` environment variables, then CLI flags.

use std::time::Duration;
use thiserror::Error;

use crate::scheduler::WorkerPoolConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for one batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Upper bound on a single processor call; `None` waits indefinitely.
    pub unit_timeout: Option<Duration>,
    /// How often progress is logged while workers run.
    pub progress_interval: Duration,
    /// How long a pool shutdown may take.
    pub shutdown_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            unit_timeout: Some(Duration::from_secs(3600)), // 1 hour
            progress_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl BatchConfig {
    /// Creates a configuration with the given worker count and default
    /// values for everything else.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Overrides fields from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GEOBATCH_WORKERS`: Number of workers
    /// - `GEOBATCH_UNIT_TIMEOUT_SECS`: Per-unit timeout in seconds (0 disables)
    /// - `GEOBATCH_PROGRESS_INTERVAL_SECS`: Progress log interval in seconds
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overrides fields from any key/value lookup.
    pub fn apply_vars(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(val) = lookup("GEOBATCH_WORKERS") {
            self.workers = parse_env_value(&val, "GEOBATCH_WORKERS")?;
        }

        if let Some(val) = lookup("GEOBATCH_UNIT_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "GEOBATCH_UNIT_TIMEOUT_SECS")?;
            self.unit_timeout = timeout_from_secs(secs);
        }

        if let Some(val) = lookup("GEOBATCH_PROGRESS_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "GEOBATCH_PROGRESS_INTERVAL_SECS")?;
            self.progress_interval = Duration::from_secs(secs);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers must be greater than 0".to_string(),
            ));
        }

        if self.progress_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "progress_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Builder method to set the per-unit timeout.
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Builder method to set the progress interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Builder method to set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Worker pool settings derived from this configuration.
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.workers)
            .with_unit_timeout(self.unit_timeout)
            .with_shutdown_timeout(self.shutdown_timeout)
    }
}

/// Converts a timeout in seconds into an optional duration; 0 means none.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

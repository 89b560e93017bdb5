//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment
//! variables.

use std::env;
use std::time::Duration;

use crate::cache::{DEFAULT_PARTITION_SIZE_HINT, DEFAULT_SWEEP_INTERVAL_MS};
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. Values are validated by [`CacheConfig::validate`]; a zero value
/// for either parameter is a fatal configuration error, never silently
/// clamped.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Initial capacity hint for a partition's entry map (not a cap)
    pub initial_partition_size_hint: usize,
    /// Background housekeeper sweep interval in milliseconds
    pub sweep_interval_millis: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// An environment variable that is set but not a positive integer
    /// (unparseable, negative or zero) is a fatal [`CacheError::Config`];
    /// values are never silently replaced by defaults.
    ///
    /// # Environment Variables
    /// - `PARTITION_SIZE_HINT` - Initial partition map capacity (default: 20)
    /// - `SWEEP_INTERVAL_MILLIS` - Sweep frequency in milliseconds (default: 15000)
    pub fn from_env() -> Result<Self> {
        let config = Self {
            initial_partition_size_hint: parse_env(
                "PARTITION_SIZE_HINT",
                DEFAULT_PARTITION_SIZE_HINT,
            )?,
            sweep_interval_millis: parse_env("SWEEP_INTERVAL_MILLIS", DEFAULT_SWEEP_INTERVAL_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Both parameters must be strictly positive. Returns
    /// [`CacheError::Config`] otherwise, so callers refuse to initialize
    /// the cache rather than run with bad values.
    pub fn validate(&self) -> Result<()> {
        if self.initial_partition_size_hint == 0 {
            return Err(CacheError::Config(
                "initial_partition_size_hint must be > 0".to_string(),
            ));
        }
        if self.sweep_interval_millis == 0 {
            return Err(CacheError::Config(
                "sweep_interval_millis must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_millis)
    }
}

/// Reads one environment variable, falling back to `default` only when the
/// variable is absent. A set-but-invalid value is a configuration error.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            CacheError::Config(format!("{name} must be a positive integer, got {raw:?}"))
        }),
        Err(_) => Ok(default),
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_partition_size_hint: DEFAULT_PARTITION_SIZE_HINT,
            sweep_interval_millis: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

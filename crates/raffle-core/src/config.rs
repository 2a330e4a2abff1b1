//! Configuration for the raffle core.
//!
//! Configuration can come from programmatic defaults, the builder, or
//! environment variables prefixed with `RAFFLE_`.

use crate::{RaffleError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete raffle configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RaffleConfig {
    /// Bounds on user-supplied lottery fields.
    pub limits: LimitsConfig,

    /// Scheduled sweep configuration.
    pub sweep: SweepConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl RaffleConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RaffleConfigBuilder {
        RaffleConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Recognized variables:
    /// - `RAFFLE_MAX_PRIZE_COUNT`
    /// - `RAFFLE_SWEEP_INTERVAL_MS`
    /// - `RAFFLE_SWEEP_BATCH_LIMIT`
    /// - `RAFFLE_LOG_LEVEL`
    /// - `RAFFLE_LOG_JSON`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(max) = std::env::var("RAFFLE_MAX_PRIZE_COUNT") {
            config.limits.max_prize_count = max.parse().map_err(|e| {
                RaffleError::Config(format!("invalid RAFFLE_MAX_PRIZE_COUNT: {}", e))
            })?;
        }

        if let Ok(interval) = std::env::var("RAFFLE_SWEEP_INTERVAL_MS") {
            config.sweep.interval_ms = interval.parse().map_err(|e| {
                RaffleError::Config(format!("invalid RAFFLE_SWEEP_INTERVAL_MS: {}", e))
            })?;
        }

        if let Ok(limit) = std::env::var("RAFFLE_SWEEP_BATCH_LIMIT") {
            config.sweep.batch_limit = limit.parse().map_err(|e| {
                RaffleError::Config(format!("invalid RAFFLE_SWEEP_BATCH_LIMIT: {}", e))
            })?;
        }

        if let Ok(level) = std::env::var("RAFFLE_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(json) = std::env::var("RAFFLE_LOG_JSON") {
            config.logging.json_output = json
                .parse()
                .map_err(|e| RaffleError::Config(format!("invalid RAFFLE_LOG_JSON: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_title_len == 0 {
            return Err(RaffleError::Config(
                "max_title_len must be greater than 0".into(),
            ));
        }

        if self.limits.max_prize_count == 0 {
            return Err(RaffleError::Config(
                "max_prize_count must be greater than 0".into(),
            ));
        }

        if self.sweep.batch_limit == 0 {
            return Err(RaffleError::Config(
                "sweep batch_limit must be greater than 0".into(),
            ));
        }

        // Sub-second sweeps hammer the store for no benefit at this volume.
        if self.sweep.interval_ms < 1_000 {
            return Err(RaffleError::Config(
                "sweep interval_ms must be at least 1000ms".into(),
            ));
        }

        Ok(())
    }
}

/// Bounds on user-supplied lottery fields, enforced at creation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum title length in characters.
    pub max_title_len: usize,

    /// Maximum description length in characters.
    pub max_description_len: usize,

    /// Maximum prize count per lottery.
    pub max_prize_count: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_title_len: 100,
            max_description_len: 1_000,
            max_prize_count: 100,
        }
    }
}

/// Scheduled sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Fixed interval between sweeps in milliseconds.
    pub interval_ms: u64,

    /// Maximum number of undrawn candidates fetched per sweep, bounding
    /// worst-case sweep duration.
    pub batch_limit: usize,
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_ms: 120_000, // 2 minutes
            batch_limit: 20,
        }
    }
}

/// Logging configuration, consumed by the binary that installs the
/// subscriber.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// JSON output format.
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_output: false,
        }
    }
}

/// Builder for RaffleConfig.
#[derive(Default)]
pub struct RaffleConfigBuilder {
    config: RaffleConfig,
}

impl RaffleConfigBuilder {
    /// Set the maximum title length.
    pub fn max_title_len(mut self, len: usize) -> Self {
        self.config.limits.max_title_len = len;
        self
    }

    /// Set the maximum prize count.
    pub fn max_prize_count(mut self, max: u32) -> Self {
        self.config.limits.max_prize_count = max;
        self
    }

    /// Set the sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the sweep batch limit.
    pub fn sweep_batch_limit(mut self, limit: usize) -> Self {
        self.config.sweep.batch_limit = limit;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Emit logs as JSON.
    pub fn log_json(mut self, json: bool) -> Self {
        self.config.logging.json_output = json;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<RaffleConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RaffleConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = RaffleConfig::builder()
            .max_prize_count(10)
            .sweep_batch_limit(5)
            .sweep_interval(Duration::from_secs(60))
            .log_level("debug")
            .log_json(true)
            .build()
            .expect("should build");

        assert_eq!(config.limits.max_prize_count, 10);
        assert_eq!(config.sweep.batch_limit, 5);
        assert_eq!(config.sweep.interval_ms, 60_000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_output);
    }

    #[test]
    fn zero_batch_limit_rejected() {
        let result = RaffleConfig::builder().sweep_batch_limit(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn sub_second_sweep_interval_rejected() {
        let result = RaffleConfig::builder()
            .sweep_interval(Duration::from_millis(200))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn zero_prize_count_limit_rejected() {
        let result = RaffleConfig::builder().max_prize_count(0).build();
        assert!(result.is_err());
    }
}

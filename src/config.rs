//! Configuration for the error handler and its components.
//!
//! Every struct has production defaults and a `validate()` check. Loading
//! configuration from files or the environment is left to the host.
//!
//! ```rust
//! use render_recovery::ErrorHandlerConfig;
//! use std::time::Duration;
//!
//! let mut config = ErrorHandlerConfig::default();
//! config.circuit_breaker.recovery_timeout = Duration::from_secs(30);
//! config.rate_limit.per_operation = false;
//! assert!(config.validate().is_ok());
//! ```

use crate::core_types::ErrorCode;
use crate::error::{ConfigError, ConfigResult};
use crate::internals::retry::{RecoveryStrategy, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level configuration for [`ErrorHandler`](crate::ErrorHandler).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlerConfig {
    /// Run the recovery orchestrator after a failed operation.
    pub auto_recovery: bool,
    /// Emit a full debug dump of every handled error.
    pub debug: bool,
    /// Number of recent sanitized error records kept for export.
    pub max_error_history: usize,
    pub enricher: EnricherConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    /// Per-strategy replacements for the tuned retry defaults.
    pub retry_overrides: BTreeMap<RecoveryStrategy, RetryConfig>,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            auto_recovery: true,
            debug: false,
            max_error_history: 100,
            enricher: EnricherConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry_overrides: BTreeMap::new(),
        }
    }
}

impl ErrorHandlerConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.enricher.validate()?;
        self.circuit_breaker.validate()?;
        self.rate_limit.validate()?;
        for (strategy, retry) in &self.retry_overrides {
            if retry.strategy != *strategy {
                return Err(ConfigError::invalid_value(
                    format!("retry_overrides.{strategy}.strategy"),
                    format!("override keyed by {strategy} declares {}", retry.strategy),
                ));
            }
            retry.validate()?;
        }
        Ok(())
    }
}

/// Context enrichment settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnricherConfig {
    /// Attach a coarse platform/process snapshot to each error.
    pub include_system_snapshot: bool,
    /// Stack frames examined by stack analysis.
    pub max_stack_frames: usize,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            include_system_snapshot: false,
            max_stack_frames: 10,
        }
    }
}

impl EnricherConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_stack_frames == 0 {
            return Err(ConfigError::invalid_value(
                "enricher.max_stack_frames",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds, shared by every operation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures while closed before the circuit opens.
    pub failure_threshold: u32,
    /// Successes while half-open before the circuit closes.
    pub success_threshold: u32,
    /// Time an open circuit waits before allowing a trial call.
    pub recovery_timeout: Duration,
    /// Codes that count toward the breaker; `None` counts every code.
    pub monitored_errors: Option<Vec<ErrorCode>>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            monitored_errors: None,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid_value(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid_value(
                "circuit_breaker.success_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Whether failures with `code` count toward opening the circuit.
    pub fn monitors(&self, code: ErrorCode) -> bool {
        self.monitored_errors
            .as_ref()
            .map_or(true, |codes| codes.contains(&code))
    }
}

/// Error budget per rolling window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Failures allowed in one window before recovery is suppressed.
    pub max_errors: u32,
    pub window: Duration,
    /// Keep one window per operation key instead of a single global one.
    pub per_operation: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_errors: 10,
            window: Duration::from_secs(60),
            per_operation: true,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_errors == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.max_errors",
                "must be at least 1",
            ));
        }
        if self.window.is_zero() {
            return Err(ConfigError::invalid_value(
                "rate_limit.window",
                "must be longer than zero",
            ));
        }
        Ok(())
    }
}

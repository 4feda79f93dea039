// Unit Tests for configuration
//
// UNIT UNDER TEST: ErrorHandlerConfig and its sections
//
// BUSINESS RESPONSIBILITY:
//   - Provides production defaults for every threshold
//   - Rejects values that would break the breaker, limiter or backoff math
//   - Accepts partial configuration documents, filling the rest with defaults
//
// TEST COVERAGE:
//   - Default values
//   - Validation failures naming the offending field
//   - Partial JSON deserialization
//   - ConfigError display formatting

use crate::config::{CircuitBreakerConfig, EnricherConfig, ErrorHandlerConfig, RateLimitConfig};
use crate::core_types::ErrorCode;
use crate::error::ConfigError;
use crate::internals::retry::{RecoveryStrategy, RetryConfig};
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(error: ConfigError) -> String {
        match error {
            ConfigError::InvalidValue { field, .. } => field,
        }
    }

    #[test]
    fn test_default_configuration() {
        // Act
        let config = ErrorHandlerConfig::default();

        // Assert
        assert!(config.auto_recovery);
        assert!(!config.debug);
        assert_eq!(config.max_error_history, 100);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.success_threshold, 3);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(60));
        assert!(config.circuit_breaker.monitored_errors.is_none());
        assert_eq!(config.rate_limit.max_errors, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert!(config.rate_limit.per_operation);
        assert!(config.retry_overrides.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_thresholds_are_rejected() {
        let breaker = CircuitBreakerConfig {
            failure_threshold: 0,
            ..CircuitBreakerConfig::default()
        };
        let limiter = RateLimitConfig {
            window: Duration::ZERO,
            ..RateLimitConfig::default()
        };
        let enricher = EnricherConfig {
            max_stack_frames: 0,
            ..EnricherConfig::default()
        };

        assert_eq!(
            breaker.validate().map_err(field_of),
            Err("circuit_breaker.failure_threshold".to_string())
        );
        assert_eq!(
            limiter.validate().map_err(field_of),
            Err("rate_limit.window".to_string())
        );
        assert_eq!(
            enricher.validate().map_err(field_of),
            Err("enricher.max_stack_frames".to_string())
        );
    }

    #[test]
    fn test_retry_overrides_are_validated() {
        // Arrange
        let mut mismatched = ErrorHandlerConfig::default();
        mismatched.retry_overrides.insert(
            RecoveryStrategy::LinearBackoff,
            RetryConfig::for_strategy(RecoveryStrategy::FixedDelay),
        );
        let mut jittery = ErrorHandlerConfig::default();
        jittery.retry_overrides.insert(
            RecoveryStrategy::LinearBackoff,
            RetryConfig {
                jitter_factor: -0.1,
                ..RetryConfig::for_strategy(RecoveryStrategy::LinearBackoff)
            },
        );

        // Act & Assert
        assert_eq!(
            mismatched.validate().map_err(field_of),
            Err("retry_overrides.LINEAR_BACKOFF.strategy".to_string())
        );
        assert_eq!(
            jittery.validate().map_err(field_of),
            Err("retry.jitter_factor".to_string())
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        // Arrange
        let json = r#"{
            "debug": true,
            "rate_limit": { "max_errors": 3 },
            "circuit_breaker": { "monitored_errors": ["CDP_TIMEOUT", "CDP_SESSION_CLOSED"] }
        }"#;

        // Act
        let config: ErrorHandlerConfig = serde_json::from_str(json).expect("valid config");

        // Assert
        assert!(config.debug);
        assert!(config.auto_recovery, "Missing fields keep their defaults");
        assert_eq!(config.rate_limit.max_errors, 3);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert!(config.circuit_breaker.monitors(ErrorCode::CdpTimeout));
        assert!(!config.circuit_breaker.monitors(ErrorCode::NetworkTimeout));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::invalid_value("rate_limit.max_errors", "must be at least 1");
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for rate_limit.max_errors: must be at least 1"
        );
    }
}

//! Crate-level error types.
//!
//! Failures of the *operations* being protected are represented by
//! [`ErrorValue`](crate::ErrorValue). The types here describe failures of this
//! crate's own setup, such as an invalid configuration.
//!
//! ```rust
//! use render_recovery::{ConfigError, ErrorHandlerConfig};
//!
//! let mut config = ErrorHandlerConfig::default();
//! config.rate_limit.max_errors = 0;
//! assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
//! ```

use crate::logging::log_error;
use thiserror::Error;

/// Convenient result type for configuration checks.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range.
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl ConfigError {
    /// Create an invalid value error (logs at ERROR level).
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        log_error!(
            error_type = "invalid_configuration",
            field = %field,
            message = %message,
            "Error handling configuration validation failed"
        );
        Self::InvalidValue { field, message }
    }
}

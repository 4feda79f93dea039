//! Logging utilities for render-recovery
//!
//! Re-exports tracing macros with log_* naming convention for consistency,
//! and defines the host-supplied [`LogSink`] the error handler reports through.

use crate::core_types::ErrorSeverity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Re-export tracing macros with log_* naming
pub use tracing::{
    debug as log_debug,
    error as log_error,
    info as log_info,
    trace as log_trace,
    warn as log_warn,
};

/// Level a message is emitted at through a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Total severity to level table.
    ///
    /// | Severity | Level |
    /// |----------|-------|
    /// | Critical, High | error |
    /// | Medium | warn |
    /// | Low | info |
    pub fn for_severity(severity: ErrorSeverity) -> Self {
        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => Self::Error,
            ErrorSeverity::Medium => Self::Warn,
            ErrorSeverity::Low => Self::Info,
        }
    }
}

/// Structured logging sink supplied by the host application.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, context: &Map<String, Value>);
}

/// Default sink forwarding into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str, context: &Map<String, Value>) {
        let fields = Value::Object(context.clone());
        match level {
            LogLevel::Debug => log_debug!(context = %fields, "{message}"),
            LogLevel::Info => log_info!(context = %fields, "{message}"),
            LogLevel::Warn => log_warn!(context = %fields, "{message}"),
            LogLevel::Error => log_error!(context = %fields, "{message}"),
        }
    }
}

//! # render-recovery
//!
//! Error classification, context enrichment and automated recovery for
//! browser-driven HTML conversion pipelines.
//!
//! ## Key Features
//!
//! - **Canonical errors**: any raised failure becomes an [`ErrorValue`] with code, category and severity always set
//! - **Rule-based classification**: an ordered, extensible [`Classifier`] rule table
//! - **Enrichment**: correlation ids, durations, stack analysis and credential redaction
//! - **Resilience**: per-operation circuit breakers, error budgets and category-driven backoff
//! - **Observability**: aggregate metrics, user-facing reports and a JSON export
//!
//! ## Example
//!
//! ```rust,no_run
//! use render_recovery::{ErrorContext, ErrorHandler, ErrorHandlerConfig, RawError};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut config = ErrorHandlerConfig::default();
//! config.circuit_breaker.failure_threshold = 3;
//! let handler = ErrorHandler::new(config)?;
//!
//! let outcome = handler
//!     .execute_with_handling(
//!         || async { Ok::<_, RawError>("<pdf bytes>".to_string()) },
//!         ErrorContext::for_operation("render_pdf").with_resource("https://example.com/report"),
//!     )
//!     .await;
//! assert!(outcome.is_success());
//! println!("{}", handler.export_json()?);
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

// Taxonomy, canonical error value and raw error representation
pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming) and the host sink trait
pub mod logging;

pub mod classifier;
pub mod clock;
pub mod config;
pub mod enricher;
pub mod error;
pub mod handler;
pub mod internals;
pub mod metrics;
pub mod report;
pub mod sanitize;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use classifier::{Classification, ClassificationRule, Classifier, Evidence};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CircuitBreakerConfig, EnricherConfig, ErrorHandlerConfig, RateLimitConfig,
};
pub use enricher::{ContextEnricher, StackAnalysis, StackPatterns, SystemSnapshot};
pub use error::{ConfigError, ConfigResult};
pub use handler::{ErrorHandler, ErrorHandlerBuilder, ExecutionOutcome, HandledError};
pub use logging::{LogLevel, LogSink, TracingSink};
pub use metrics::{ErrorMetrics, FrequentError, MetricsAggregator};
pub use report::{ErrorRecord, ExportDocument};

// Resilience machinery
pub use internals::circuit_breaker::{
    CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState,
};
pub use internals::rate_limiter::{RateLimitSnapshot, RateLimiter};
pub use internals::retry::{
    standard_degradation, Fallback, RecoveryOrchestrator, RecoveryResult, RecoveryStrategy,
    RetryConfig,
};

// Re-export core types
pub use core_types::{
    ErrorCategory, ErrorCode, ErrorContext, ErrorSeverity, ErrorSource, ErrorValue, RawError,
    RetryInfo,
};

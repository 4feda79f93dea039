//! The error handling facade.
//!
//! [`ErrorHandler`] composes the classifier, enricher, metrics and recovery
//! orchestrator. Build one per application (or per request scope) and pass it
//! where it is needed; there is no process-wide default instance.
//!
//! ```rust,no_run
//! use render_recovery::{ErrorContext, ErrorHandler, RawError};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handler = ErrorHandler::builder().build()?;
//!
//! let outcome = handler
//!     .execute_with_handling(
//!         || async { Err::<String, _>(RawError::error("Error", "connect ECONNREFUSED 127.0.0.1:9222")) },
//!         ErrorContext::for_operation("connect_browser"),
//!     )
//!     .await;
//!
//! if let Some(error) = &outcome.error {
//!     eprintln!("{}", handler.user_report(error));
//! }
//! # Ok(())
//! # }
//! ```

use crate::classifier::{Classification, Classifier};
use crate::clock::{Clock, SystemClock};
use crate::config::ErrorHandlerConfig;
use crate::core_types::{ErrorCode, ErrorContext, ErrorValue, RawError, RetryInfo};
use crate::enricher::ContextEnricher;
use crate::error::ConfigResult;
use crate::internals::circuit_breaker::{CircuitBreakerRegistry, CircuitBreakerSnapshot};
use crate::internals::rate_limiter::{RateLimitSnapshot, RateLimiter};
use crate::internals::retry::{Fallback, RecoveryOrchestrator, RecoveryResult};
use crate::logging::{log_error, log_info, LogLevel, LogSink, TracingSink};
use crate::metrics::{ErrorMetrics, MetricsAggregator};
use crate::report::{user_report, ErrorRecord, ExportDocument};
use crate::sanitize::sanitize_text;
use futures_util::FutureExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A normalized, enriched error together with how it was classified.
#[derive(Debug, Clone)]
pub struct HandledError {
    pub error: ErrorValue,
    pub classification: Classification,
}

/// Result of [`ErrorHandler::execute_with_handling`].
///
/// `value` is set when the operation succeeded, either directly or through
/// recovery. `error` is the normalized first failure, or the recovery failure
/// if the recovery machinery itself broke. A recovered value is moved out of
/// `recovery` into `value`.
#[derive(Debug)]
pub struct ExecutionOutcome<T> {
    pub value: Option<T>,
    pub error: Option<ErrorValue>,
    pub classification: Option<Classification>,
    pub recovery: Option<RecoveryResult<T>>,
}

impl<T> ExecutionOutcome<T> {
    fn succeeded(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
            classification: None,
            recovery: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    /// Whether the value came from a degraded fallback.
    pub fn is_degraded(&self) -> bool {
        self.recovery.as_ref().is_some_and(|r| r.degraded)
    }

    /// The value, or the error recovery was started for.
    pub fn into_result(self) -> Result<T, ErrorValue> {
        match (self.value, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ErrorValue::new(
                ErrorCode::UnknownError,
                "operation produced neither a value nor an error",
            )),
        }
    }
}

/// Builder for [`ErrorHandler`].
pub struct ErrorHandlerBuilder {
    config: ErrorHandlerConfig,
    clock: Option<Arc<dyn Clock>>,
    sink: Option<Arc<dyn LogSink>>,
    classifier: Option<Classifier>,
}

impl ErrorHandlerBuilder {
    pub fn with_config(mut self, config: ErrorHandlerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Structured sink for handled errors; defaults to [`TracingSink`].
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Classifier with a custom rule table.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Validate the configuration and wire the components together.
    pub fn build(self) -> ConfigResult<ErrorHandler> {
        self.config.validate()?;

        let config = self.config;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn LogSink>);
        let classifier = Arc::new(self.classifier.unwrap_or_default());

        let circuit_breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker.clone(),
            Arc::clone(&clock),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), Arc::clone(&clock)));
        let orchestrator = RecoveryOrchestrator::new(
            Arc::clone(&classifier),
            Arc::clone(&circuit_breakers),
            Arc::clone(&rate_limiter),
        )
        .with_retry_overrides(config.retry_overrides.clone());

        log_info!(
            auto_recovery = config.auto_recovery,
            debug = config.debug,
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_errors = config.rate_limit.max_errors,
            "Error handler initialized"
        );

        Ok(ErrorHandler {
            enricher: ContextEnricher::new(config.enricher.clone(), Arc::clone(&clock)),
            metrics: MetricsAggregator::new(Arc::clone(&clock)),
            history: Mutex::new(VecDeque::with_capacity(config.max_error_history)),
            config,
            clock,
            sink,
            classifier,
            circuit_breakers,
            rate_limiter,
            orchestrator,
        })
    }
}

/// Classifies, enriches, records and recovers failed operations.
pub struct ErrorHandler {
    config: ErrorHandlerConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn LogSink>,
    classifier: Arc<Classifier>,
    enricher: ContextEnricher,
    metrics: MetricsAggregator,
    circuit_breakers: Arc<CircuitBreakerRegistry>,
    rate_limiter: Arc<RateLimiter>,
    orchestrator: RecoveryOrchestrator,
    history: Mutex<VecDeque<ErrorRecord>>,
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ErrorHandler {
    pub fn builder() -> ErrorHandlerBuilder {
        ErrorHandlerBuilder {
            config: ErrorHandlerConfig::default(),
            clock: None,
            sink: None,
            classifier: None,
        }
    }

    /// Handler with `config`, the system clock and the tracing sink.
    pub fn new(config: ErrorHandlerConfig) -> ConfigResult<Self> {
        Self::builder().with_config(config).build()
    }

    pub fn config(&self) -> &ErrorHandlerConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn orchestrator(&self) -> &RecoveryOrchestrator {
        &self.orchestrator
    }

    /// Normalize, enrich and record a failure. Never retries and never fails.
    pub fn handle(&self, raw: impl Into<RawError>, hint: ErrorContext) -> HandledError {
        let raw = raw.into();
        let fresh = !matches!(raw, RawError::Classified(_));

        let (mut error, classification) = self.classifier.classify(raw, hint);
        if fresh {
            error = error.with_timestamp(self.clock.now());
        }
        let error = self.enricher.enrich(error);

        self.metrics.record_error(&error);
        self.remember(&error);
        self.report(&error, &classification);

        HandledError {
            error,
            classification,
        }
    }

    /// Run `operation`; on failure, handle the error and (when auto-recovery
    /// is on) retry it through the recovery orchestrator.
    pub async fn execute_with_handling<T, F, Fut, E>(
        &self,
        operation: F,
        hint: ErrorContext,
    ) -> ExecutionOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        self.execute_with_fallbacks(operation, hint, &[]).await
    }

    /// [`execute_with_handling`](Self::execute_with_handling) with degraded
    /// alternatives to try once retries are exhausted.
    pub async fn execute_with_fallbacks<T, F, Fut, E>(
        &self,
        operation: F,
        hint: ErrorContext,
        fallbacks: &[Fallback<T>],
    ) -> ExecutionOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        let raw = match operation().await {
            Ok(value) => return ExecutionOutcome::succeeded(value),
            Err(raw) => raw.into(),
        };

        let HandledError {
            error,
            classification,
        } = self.handle(raw, hint);

        if !self.config.auto_recovery {
            return ExecutionOutcome {
                value: None,
                error: Some(error),
                classification: Some(classification),
                recovery: None,
            };
        }

        let context = error.context().clone();
        let attempt = AssertUnwindSafe(self.orchestrator.attempt_recovery_with_fallbacks(
            &error,
            &operation,
            &context,
            fallbacks,
        ))
        .catch_unwind()
        .await;

        match attempt {
            Ok(mut recovery) => {
                self.metrics.record_recovery(recovery.success);
                ExecutionOutcome {
                    value: recovery.value.take(),
                    error: Some(error),
                    classification: Some(classification),
                    recovery: Some(recovery),
                }
            }
            Err(panic) => {
                self.metrics.record_recovery(false);
                self.orchestrator
                    .circuit_breakers()
                    .release_trial(error.operation_key());
                let failure = self.recovery_failure(&error, &*panic);
                ExecutionOutcome {
                    value: None,
                    error: Some(failure),
                    classification: Some(classification),
                    recovery: None,
                }
            }
        }
    }

    pub fn metrics(&self) -> ErrorMetrics {
        self.metrics.snapshot()
    }

    pub fn circuit_breaker_states(&self) -> BTreeMap<String, CircuitBreakerSnapshot> {
        self.circuit_breakers.snapshot()
    }

    pub fn rate_limit_states(&self) -> BTreeMap<String, RateLimitSnapshot> {
        self.rate_limiter.snapshot()
    }

    /// Sanitized records of the most recent errors, oldest first.
    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.history().iter().cloned().collect()
    }

    pub fn user_report(&self, error: &ErrorValue) -> String {
        user_report(error)
    }

    pub fn export(&self) -> ExportDocument {
        ExportDocument {
            exported_at: self.clock.now(),
            metrics: self.metrics(),
            circuit_breakers: self.circuit_breaker_states(),
            rate_limits: self.rate_limit_states(),
            errors: self.recent_errors(),
        }
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        self.export().to_json()
    }

    /// Clear metrics, circuit breakers, error budgets and history.
    pub fn reset(&self) {
        self.metrics.reset();
        self.circuit_breakers.reset();
        self.rate_limiter.reset();
        self.history().clear();
        log_info!("Error handler state reset");
    }

    fn remember(&self, error: &ErrorValue) {
        let max = self.config.max_error_history;
        let mut history = self.history();
        history.push_back(ErrorRecord::from_error(error));
        while history.len() > max {
            history.pop_front();
        }
    }

    fn report(&self, error: &ErrorValue, classification: &Classification) {
        let level = LogLevel::for_severity(error.severity());
        let message = format!("{}: {}", error.code(), error.message());
        self.sink.log(level, &message, &log_fields(error, classification));

        if self.config.debug {
            let mut dump = Map::new();
            dump.insert("error".to_string(), json!(ErrorRecord::from_error(error)));
            dump.insert("classification".to_string(), json!(classification));
            dump.insert(
                "metadata".to_string(),
                Value::Object(error.context().metadata.clone()),
            );
            if let Some(stack) = error.stack() {
                dump.insert("stack".to_string(), json!(stack));
            }
            if let Some(original) = error.original() {
                dump.insert("originalError".to_string(), json!(sanitize_text(&original.to_string())));
            }
            self.sink.log(LogLevel::Debug, "Error debug dump", &dump);
        }
    }

    fn recovery_failure(&self, error: &ErrorValue, panic: &(dyn Any + Send)) -> ErrorValue {
        let reason = panic_message(panic);
        let mut context = error.context().clone();
        context.retry_info = Some(RetryInfo::not_retryable());
        context
            .metadata
            .insert("originalCode".to_string(), json!(error.code()));

        let failure = ErrorValue::new(
            ErrorCode::RecoveryFailed,
            format!("Recovery mechanism failed: {reason}"),
        )
        .with_context(context)
        .with_timestamp(self.clock.now())
        .with_original(Arc::new(error.clone()));

        log_error!(
            code = %failure.code(),
            original_code = %error.code(),
            operation = error.operation_key(),
            reason = %reason,
            "Recovery mechanism failed"
        );
        let mut fields = Map::new();
        fields.insert("code".to_string(), json!(failure.code()));
        fields.insert("originalCode".to_string(), json!(error.code()));
        fields.insert("operation".to_string(), json!(error.operation_key()));
        self.sink.log(LogLevel::Error, failure.message(), &fields);
        failure
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<ErrorRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_fields(error: &ErrorValue, classification: &Classification) -> Map<String, Value> {
    let context = error.context();
    let mut fields = Map::new();
    fields.insert("code".to_string(), json!(error.code()));
    fields.insert("category".to_string(), json!(error.category()));
    fields.insert("severity".to_string(), json!(error.severity()));
    fields.insert("source".to_string(), json!(error.origin()));
    fields.insert("operation".to_string(), json!(error.operation_key()));
    fields.insert("retryable".to_string(), json!(error.is_retryable()));
    fields.insert(
        "classificationConfidence".to_string(),
        json!(classification.confidence),
    );
    if let Some(id) = &context.correlation_id {
        fields.insert("correlationId".to_string(), json!(id));
    }
    if let Some(resource) = &context.resource {
        fields.insert("resource".to_string(), json!(sanitize_text(resource)));
    }
    fields
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Strategy-driven recovery with backoff, circuit breaking and rate limiting
//!
//! This module retries failed operations according to the failure's category:
//! - Exponential backoff for network and resource failures
//! - Linear backoff for timeouts
//! - A single delayed retry behind the circuit breaker for protocol failures
//! - Fixed delays for rendering and memory-pressure failures
//! - No retry for everything else
//!
//! Attempts for one call are strictly sequential. Each failure is normalized
//! through the classifier and the loop branches on the resulting
//! [`ErrorValue`], never on unwinding.

use crate::classifier::Classifier;
use crate::core_types::{ErrorCategory, ErrorCode, ErrorContext, ErrorValue, RawError};
use crate::error::{ConfigError, ConfigResult};
use crate::internals::circuit_breaker::CircuitBreakerRegistry;
use crate::internals::rate_limiter::RateLimiter;
use crate::logging::{log_debug, log_error, log_info, log_warn};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// How a failed operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    None,
    FixedDelay,
    LinearBackoff,
    ExponentialBackoff,
    CircuitBreaker,
}

impl RecoveryStrategy {
    /// Strategy for an error, chosen from its category (memory codes first).
    pub fn for_error(error: &ErrorValue) -> Self {
        if error.code().is_memory_limit() {
            return Self::FixedDelay;
        }
        match error.category() {
            ErrorCategory::NetworkError | ErrorCategory::ResourceError => {
                Self::ExponentialBackoff
            }
            ErrorCategory::Timeout => Self::LinearBackoff,
            ErrorCategory::CdpError => Self::CircuitBreaker,
            ErrorCategory::RenderingError => Self::FixedDelay,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::FixedDelay => "FIXED_DELAY",
            Self::LinearBackoff => "LINEAR_BACKOFF",
            Self::ExponentialBackoff => "EXPONENTIAL_BACKOFF",
            Self::CircuitBreaker => "CIRCUIT_BREAKER",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry tuning for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the failure that triggered recovery.
    pub max_retries: u32,
    /// Base delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor for exponential and linear backoff
    pub backoff_multiplier: f64,
    /// Fraction (0..=1) of random extra delay
    pub jitter_factor: f64,
    pub strategy: RecoveryStrategy,
}

impl RetryConfig {
    /// Tuned defaults per strategy.
    ///
    /// | Strategy | Retries | Initial | Max | Multiplier | Jitter |
    /// |----------|---------|---------|-----|------------|--------|
    /// | Exponential | 5 | 1s | 30s | 2.5 | 0.2 |
    /// | Linear | 3 | 1s | 10s | 1.5 | 0.1 |
    /// | Fixed | 2 | 2s | 2s | 1.0 | 0 |
    /// | Circuit breaker | 1 | 5s | 5s | 1.0 | 0 |
    /// | None | 0 | - | - | - | - |
    pub fn for_strategy(strategy: RecoveryStrategy) -> Self {
        match strategy {
            RecoveryStrategy::ExponentialBackoff => Self {
                max_retries: 5,
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.5,
                jitter_factor: 0.2,
                strategy,
            },
            RecoveryStrategy::LinearBackoff => Self {
                max_retries: 3,
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
                backoff_multiplier: 1.5,
                jitter_factor: 0.1,
                strategy,
            },
            RecoveryStrategy::FixedDelay => Self {
                max_retries: 2,
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(2),
                backoff_multiplier: 1.0,
                jitter_factor: 0.0,
                strategy,
            },
            RecoveryStrategy::CircuitBreaker => Self {
                max_retries: 1,
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(5),
                backoff_multiplier: 1.0,
                jitter_factor: 0.0,
                strategy,
            },
            RecoveryStrategy::None => Self {
                max_retries: 0,
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                backoff_multiplier: 1.0,
                jitter_factor: 0.0,
                strategy,
            },
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid_value(
                "retry.backoff_multiplier",
                format!("must be a finite value >= 1.0, got {}", self.backoff_multiplier),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::invalid_value(
                "retry.jitter_factor",
                format!("must be within 0..=1, got {}", self.jitter_factor),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid_value(
                "retry.max_delay",
                "must not be shorter than initial_delay",
            ));
        }
        Ok(())
    }

    /// Delay in milliseconds for a 1-indexed attempt, before jitter and clamping.
    pub fn base_delay_ms(&self, attempt: u32) -> f64 {
        let initial = self.initial_delay.as_secs_f64() * 1000.0;
        let step = f64::from(attempt.max(1) - 1);
        match self.strategy {
            RecoveryStrategy::ExponentialBackoff => initial * self.backoff_multiplier.powf(step),
            RecoveryStrategy::LinearBackoff => {
                initial + step * initial * (self.backoff_multiplier - 1.0)
            }
            RecoveryStrategy::FixedDelay
            | RecoveryStrategy::CircuitBreaker
            | RecoveryStrategy::None => initial,
        }
    }

    /// Delay for an attempt given a uniform sample in `0..1` for jitter.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.base_delay_ms(attempt);
        let jittered = base + base * self.jitter_factor * sample.clamp(0.0, 1.0);
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let clamped = if jittered.is_finite() {
            jittered.clamp(0.0, max_ms)
        } else {
            max_ms
        };
        Duration::from_secs_f64(clamped / 1000.0)
    }

    /// Delay for an attempt with random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, fastrand::f64())
    }
}

/// Degraded alternative tried once retries are exhausted.
///
/// ```rust
/// use render_recovery::{ErrorCategory, Fallback};
///
/// let fallback = Fallback::standard(ErrorCategory::RenderingError, || async {
///     Ok::<_, render_recovery::RawError>("rendered without scripts".to_string())
/// });
/// assert_eq!(fallback.description(), "retry without script execution");
/// ```
pub struct Fallback<T> {
    category: ErrorCategory,
    description: String,
    run: Box<dyn Fn() -> BoxFuture<'static, Result<T, RawError>> + Send + Sync>,
}

impl<T> fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback")
            .field("category", &self.category)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Fallback<T> {
    pub fn new<F, Fut>(category: ErrorCategory, description: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RawError>> + Send + 'static,
    {
        Self {
            category,
            description: description.into(),
            run: Box::new(move || run().boxed()),
        }
    }

    /// Fallback described with the standard degradation for its category.
    pub fn standard<F, Fut>(category: ErrorCategory, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RawError>> + Send + 'static,
    {
        let description = standard_degradation(category).unwrap_or("degraded alternative");
        Self::new(category, description, run)
    }
}

impl<T> Fallback<T> {
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Standard degraded mode for a category, if there is one.
pub fn standard_degradation(category: ErrorCategory) -> Option<&'static str> {
    match category {
        ErrorCategory::RenderingError => Some("retry without script execution"),
        ErrorCategory::ExportError => Some("alternate output format"),
        ErrorCategory::NetworkError => Some("offline/cached mode"),
        _ => None,
    }
}

/// Outcome of one recovery attempt.
#[derive(Debug)]
pub struct RecoveryResult<T> {
    pub success: bool,
    /// Operation invocations made by the orchestrator.
    pub attempts: u32,
    pub total_duration: Duration,
    /// The error recovery was started for, set whenever recovery fails.
    pub final_error: Option<ErrorValue>,
    /// Classified failure from the most recent invocation, if any ran.
    pub last_failure: Option<ErrorValue>,
    /// Ordered human-readable trace of decisions.
    pub actions: Vec<String>,
    /// Success came from a fallback rather than the operation itself.
    pub degraded: bool,
    pub value: Option<T>,
}

impl<T> RecoveryResult<T> {
    fn failed(
        error: &ErrorValue,
        last_failure: Option<ErrorValue>,
        attempts: u32,
        actions: Vec<String>,
        started: Instant,
    ) -> Self {
        Self {
            success: false,
            attempts,
            total_duration: started.elapsed(),
            final_error: Some(error.clone()),
            last_failure,
            actions,
            degraded: false,
            value: None,
        }
    }

    fn succeeded(value: T, attempts: u32, actions: Vec<String>, started: Instant, degraded: bool) -> Self {
        Self {
            success: true,
            attempts,
            total_duration: started.elapsed(),
            final_error: None,
            last_failure: None,
            actions,
            degraded,
            value: Some(value),
        }
    }
}

/// Runs the retry loop for failed operations.
#[derive(Debug)]
pub struct RecoveryOrchestrator {
    classifier: Arc<Classifier>,
    circuit_breakers: Arc<CircuitBreakerRegistry>,
    rate_limiter: Arc<RateLimiter>,
    retry_overrides: BTreeMap<RecoveryStrategy, RetryConfig>,
}

impl RecoveryOrchestrator {
    pub fn new(
        classifier: Arc<Classifier>,
        circuit_breakers: Arc<CircuitBreakerRegistry>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            classifier,
            circuit_breakers,
            rate_limiter,
            retry_overrides: BTreeMap::new(),
        }
    }

    /// Replace the tuned defaults for some strategies.
    pub fn with_retry_overrides(mut self, overrides: BTreeMap<RecoveryStrategy, RetryConfig>) -> Self {
        self.retry_overrides = overrides;
        self
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.circuit_breakers
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Effective retry config for an error: the tuned config of its
    /// strategy, or the override registered for that strategy.
    pub fn retry_config_for(&self, error: &ErrorValue) -> RetryConfig {
        let strategy = RecoveryStrategy::for_error(error);
        self.retry_overrides
            .get(&strategy)
            .cloned()
            .unwrap_or_else(|| RetryConfig::for_strategy(strategy))
    }

    /// Retry `operation` after it failed with `error`.
    pub async fn attempt_recovery<T, F, Fut, E>(
        &self,
        error: &ErrorValue,
        operation: F,
        context: &ErrorContext,
    ) -> RecoveryResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        self.attempt_recovery_with_fallbacks(error, operation, context, &[])
            .await
    }

    /// Retry `operation`, then try matching `fallbacks` once retries are exhausted.
    pub async fn attempt_recovery_with_fallbacks<T, F, Fut, E>(
        &self,
        error: &ErrorValue,
        operation: F,
        context: &ErrorContext,
        fallbacks: &[Fallback<T>],
    ) -> RecoveryResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        let started = Instant::now();
        let key = context
            .operation
            .clone()
            .unwrap_or_else(|| error.operation_key().to_string());
        let mut actions = Vec::new();

        if self.rate_limiter.is_limited(&key) {
            actions.push(format!("Rate limited: error budget exhausted for '{key}'"));
            log_warn!(operation = %key, code = %error.code(), "Recovery suppressed by rate limiter");
            return RecoveryResult::failed(error, None, 0, actions, started);
        }

        if self.circuit_breakers.is_open(&key, error) {
            actions.push("Circuit breaker open, failing fast".to_string());
            log_warn!(operation = %key, code = %error.code(), "Recovery suppressed by open circuit");
            return RecoveryResult::failed(error, None, 0, actions, started);
        }

        let config = self.retry_config_for(error);
        actions.push(format!(
            "Selected {} strategy for {} (max {} retries)",
            config.strategy,
            error.category(),
            config.max_retries
        ));

        if config.max_retries == 0 || !error.is_retryable() {
            actions.push("Error not retryable".to_string());
            log_debug!(operation = %key, code = %error.code(), "Error not retryable, skipping recovery");
            self.circuit_breakers.release_trial(&key);
            return RecoveryResult::failed(error, None, 0, actions, started);
        }

        let mut attempts = 0;
        let mut last_failure: Option<ErrorValue> = None;
        let mut protocol_failures = 0u32;

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                if self.rate_limiter.is_limited(&key) {
                    actions.push(format!("Rate limited: error budget exhausted for '{key}'"));
                    break;
                }
                if self
                    .circuit_breakers
                    .is_open(&key, last_failure.as_ref().unwrap_or(error))
                {
                    actions.push("Circuit breaker open, failing fast".to_string());
                    break;
                }
                let delay = config.delay(attempt);
                actions.push(format!(
                    "Waiting {}ms before attempt {}",
                    delay.as_millis(),
                    attempt + 1
                ));
                sleep(delay).await;
            }

            attempts += 1;
            log_debug!(
                operation = %key,
                attempt = attempts,
                max_retries = config.max_retries,
                strategy = %config.strategy,
                "Executing recovery attempt"
            );

            match operation().await {
                Ok(value) => {
                    self.circuit_breakers.record_success(&key);
                    actions.push(format!("Attempt {attempts} succeeded"));
                    log_info!(
                        operation = %key,
                        attempts = attempts,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Recovery succeeded"
                    );
                    return RecoveryResult::succeeded(value, attempts, actions, started, false);
                }
                Err(raw) => {
                    let (failure, _) = self.classifier.classify(raw.into(), attempt_hint(context));
                    actions.push(format!("Attempt {attempts} failed: {}", failure.code()));
                    self.circuit_breakers.record_failure(&key, &failure);
                    self.rate_limiter.record_error(&key);
                    apply_adaptive_hints(&failure, &mut protocol_failures, &mut actions);

                    if !failure.is_retryable() {
                        actions.push(format!("{} is not retryable, stopping", failure.code()));
                        log_warn!(
                            operation = %key,
                            attempts = attempts,
                            code = %failure.code(),
                            "Recovery stopped on non-retryable failure"
                        );
                        return RecoveryResult::failed(
                            error,
                            Some(failure),
                            attempts,
                            actions,
                            started,
                        );
                    }
                    last_failure = Some(failure);
                }
            }
        }

        if let Some(result) = self
            .degrade(error.category(), fallbacks, attempts, &mut actions, started)
            .await
        {
            return result;
        }

        actions.push(format!("Recovery failed after {attempts} attempts"));
        log_error!(
            operation = %key,
            attempts = attempts,
            total_duration_ms = started.elapsed().as_millis() as u64,
            code = %error.code(),
            last_code = ?last_failure.as_ref().map(ErrorValue::code),
            "Recovery failed after all retry attempts"
        );
        RecoveryResult::failed(error, last_failure, attempts, actions, started)
    }

    async fn degrade<T>(
        &self,
        category: ErrorCategory,
        fallbacks: &[Fallback<T>],
        attempts: u32,
        actions: &mut Vec<String>,
        started: Instant,
    ) -> Option<RecoveryResult<T>> {
        let mut candidates = fallbacks.iter().filter(|f| f.category == category).peekable();
        if candidates.peek().is_none() {
            actions.push(format!("No degraded alternative for {category}"));
            return None;
        }

        for fallback in candidates {
            actions.push(format!("Attempting degradation: {}", fallback.description));
            match (fallback.run)().await {
                Ok(value) => {
                    actions.push(format!("Degraded mode succeeded: {}", fallback.description));
                    log_warn!(
                        category = %category,
                        fallback = %fallback.description,
                        "Recovered in degraded mode"
                    );
                    return Some(RecoveryResult::succeeded(
                        value,
                        attempts,
                        std::mem::take(actions),
                        started,
                        true,
                    ));
                }
                Err(raw) => {
                    let (failure, _) = self.classifier.classify(raw, ErrorContext::new());
                    actions.push(format!(
                        "Degradation failed: {} ({})",
                        fallback.description,
                        failure.code()
                    ));
                }
            }
        }
        None
    }
}

/// Context for classifying a retry failure: identity fields only, so the new
/// failure gets its own retry guidance and suggestions.
fn attempt_hint(context: &ErrorContext) -> ErrorContext {
    ErrorContext {
        operation: context.operation.clone(),
        resource: context.resource.clone(),
        correlation_id: context.correlation_id.clone(),
        ..ErrorContext::default()
    }
}

fn apply_adaptive_hints(failure: &ErrorValue, protocol_failures: &mut u32, actions: &mut Vec<String>) {
    if failure.category() == ErrorCategory::CdpError {
        *protocol_failures += 1;
        if *protocol_failures >= 2 {
            actions.push(format!(
                "Suggest restarting the browser process after {protocol_failures} consecutive protocol failures"
            ));
            log_warn!(
                consecutive_failures = *protocol_failures,
                "Repeated protocol failures, browser restart recommended"
            );
        }
    } else {
        *protocol_failures = 0;
    }

    if matches!(failure.code(), ErrorCode::OutOfMemory | ErrorCode::MemoryLimitExceeded) {
        actions.push("Suggest clearing caches before the next attempt".to_string());
        log_warn!(code = %failure.code(), "Memory pressure detected during recovery");
    }

    if failure.category() == ErrorCategory::Timeout {
        actions.push("Consider increasing the operation timeout".to_string());
    }
}

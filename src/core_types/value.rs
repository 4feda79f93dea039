//! The canonical error record.
//!
//! An [`ErrorValue`] is created once per failure, normally by the
//! [`Classifier`](crate::classifier::Classifier). Its taxonomy fields (code,
//! category, severity, source) are fixed at construction; only the
//! [`ErrorContext`] may be merged into afterwards.

use crate::core_types::raw::RawError;
use crate::core_types::taxonomy::{ErrorCategory, ErrorCode, ErrorSeverity, ErrorSource};
use crate::sanitize::sanitize_text;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Operation key used when a context does not name one.
pub const DEFAULT_OPERATION: &str = "default";

/// Number of stack lines kept on an [`ErrorValue`].
pub const MAX_STACK_LINES: usize = 10;

/// Retry guidance carried in an error's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryInfo {
    pub can_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_ms: Option<u64>,
}

impl RetryInfo {
    pub fn retryable(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            can_retry: true,
            max_retries: Some(max_retries),
            backoff_ms: Some(backoff_ms),
        }
    }

    pub fn not_retryable() -> Self {
        Self {
            can_retry: false,
            max_retries: None,
            backoff_ms: None,
        }
    }
}

/// Structured diagnostic context attached to an error.
///
/// `operation` is the key used by the circuit breaker and rate limiter;
/// everything else is informational. Build one with the `with_*` methods:
///
/// ```rust
/// use render_recovery::ErrorContext;
///
/// let ctx = ErrorContext::for_operation("render_pdf")
///     .with_resource("https://example.com/report.html")
///     .with_metadata("pageCount", 3);
/// assert_eq!(ctx.operation_key(), "render_pdf");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_info: Option<RetryInfo>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_operation(operation: impl Into<String>) -> Self {
        Self::new().with_operation(operation)
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_retry_info(mut self, retry_info: RetryInfo) -> Self {
        self.retry_info = Some(retry_info);
        self
    }

    /// Add a metadata entry. Values that fail to serialize are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }

    /// Key used for per-operation state, falling back to [`DEFAULT_OPERATION`].
    pub fn operation_key(&self) -> &str {
        self.operation.as_deref().unwrap_or(DEFAULT_OPERATION)
    }

    /// Merge `other` into `self`.
    ///
    /// Fields set in `other` win, suggestions are appended without duplicates
    /// and metadata entries are inserted over existing keys.
    pub fn merge(&mut self, other: ErrorContext) {
        if other.operation.is_some() {
            self.operation = other.operation;
        }
        if other.resource.is_some() {
            self.resource = other.resource;
        }
        if other.correlation_id.is_some() {
            self.correlation_id = other.correlation_id;
        }
        if other.retry_info.is_some() {
            self.retry_info = other.retry_info;
        }
        for suggestion in other.suggestions {
            if !self.suggestions.contains(&suggestion) {
                self.suggestions.push(suggestion);
            }
        }
        self.metadata.extend(other.metadata);
    }
}

/// Canonical, fully classified error.
///
/// Code, category, severity and source are always set. The wrapped original
/// failure, when there is one, is exposed through
/// [`std::error::Error::source`].
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ErrorValue {
    code: ErrorCode,
    category: ErrorCategory,
    severity: ErrorSeverity,
    origin: ErrorSource,
    message: String,
    context: ErrorContext,
    timestamp: DateTime<Utc>,
    #[source]
    original: Option<Arc<dyn std::error::Error + Send + Sync>>,
    stack: Option<String>,
}

impl ErrorValue {
    /// Create an error whose category and severity come from the code tables.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_taxonomy(code, code.category(), code.severity(), message)
    }

    /// Create an error with an explicit taxonomy.
    pub fn with_taxonomy(
        code: ErrorCode,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            category,
            severity,
            origin: ErrorSource::Application,
            message: sanitize_text(&message.into()),
            context: ErrorContext::default(),
            timestamp: Utc::now(),
            original: None,
            stack: None,
        }
    }

    /// Normalize any raised value with caller-chosen defaults.
    ///
    /// An input that is already an [`ErrorValue`] keeps its taxonomy and only
    /// has `overrides` merged into its context, so normalizing twice is a
    /// no-op for code, category and severity. Missing messages fall back to
    /// `default_message`; nothing here can fail.
    pub fn from_raw(
        raw: RawError,
        default_message: &str,
        default_code: ErrorCode,
        default_category: ErrorCategory,
        overrides: ErrorContext,
    ) -> Self {
        let origin = if raw.is_error_instance() {
            ErrorSource::Application
        } else {
            ErrorSource::Unknown
        };
        let message = raw
            .message()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_message.to_string());

        match raw {
            RawError::Classified(mut value) => {
                value.merge_context(overrides);
                value
            }
            RawError::Error { source, stack, .. } => {
                let mut value = Self::with_taxonomy(
                    default_code,
                    default_category,
                    default_code.severity(),
                    message,
                )
                .with_origin(origin)
                .with_context(overrides);
                value.original = source;
                if let Some(stack) = stack {
                    value = value.with_stack(stack);
                }
                value.ensure_retry_info();
                value
            }
            RawError::Message(_) | RawError::Object(_) | RawError::Empty => {
                let mut value = Self::with_taxonomy(
                    default_code,
                    default_category,
                    default_code.severity(),
                    message,
                )
                .with_origin(origin)
                .with_context(overrides);
                value.ensure_retry_info();
                value
            }
        }
    }

    pub fn with_origin(mut self, origin: ErrorSource) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_original(mut self, original: Arc<dyn std::error::Error + Send + Sync>) -> Self {
        self.original = Some(original);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a stack trace, keeping at most [`MAX_STACK_LINES`] lines.
    pub fn with_stack(mut self, stack: impl AsRef<str>) -> Self {
        let truncated: Vec<&str> = stack.as_ref().lines().take(MAX_STACK_LINES).collect();
        self.stack = Some(truncated.join("\n"));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    /// Inferred source of the failure.
    pub fn origin(&self) -> ErrorSource {
        self.origin
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn original(&self) -> Option<&Arc<dyn std::error::Error + Send + Sync>> {
        self.original.as_ref()
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    pub fn operation_key(&self) -> &str {
        self.context.operation_key()
    }

    /// Retry guidance from the context, or the code's default when unset.
    pub fn retry_info(&self) -> RetryInfo {
        self.context
            .retry_info
            .unwrap_or_else(|| self.code.default_retry())
    }

    /// Whether this failure is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.retry_info().can_retry
    }

    /// Merge additional context; taxonomy fields are untouched.
    pub fn merge_context(&mut self, overrides: ErrorContext) {
        self.context.merge(overrides);
    }

    pub(crate) fn replace_context(&mut self, context: ErrorContext) {
        self.context = context;
    }

    fn ensure_retry_info(&mut self) {
        if self.context.retry_info.is_none() {
            self.context.retry_info = Some(self.code.default_retry());
        }
    }
}

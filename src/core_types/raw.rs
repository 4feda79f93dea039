//! Raised failures before classification.
//!
//! Operations report failures as anything convertible into a [`RawError`]:
//! an already classified [`ErrorValue`], an error instance, a bare message, a
//! structured value or nothing at all. The classifier turns every one of these
//! into an [`ErrorValue`].

use crate::core_types::value::ErrorValue;
use serde_json::Value;
use std::backtrace::BacktraceStatus;
use std::sync::Arc;

/// A failure as it was raised.
#[derive(Debug, Clone)]
pub enum RawError {
    /// Already normalized; classification only merges context.
    Classified(ErrorValue),
    /// An error instance.
    Error {
        /// Short type name, e.g. `io::Error` or `TypeError`.
        type_name: String,
        message: String,
        /// POSIX-style code such as `ENOENT`, when known.
        code: Option<String>,
        stack: Option<String>,
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },
    /// A bare message that is not an error instance.
    Message(String),
    /// A structured value, e.g. a protocol error payload.
    Object(Value),
    /// Nothing was raised beyond the fact of failure.
    Empty,
}

impl RawError {
    /// Error instance with an explicit type name and message.
    pub fn error(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            type_name: type_name.into(),
            message: message.into(),
            code: None,
            stack: None,
            source: None,
        }
    }

    /// Wrap any standard error, keeping it as the original cause.
    ///
    /// The message includes the full `source()` chain.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut message = error.to_string();
        let mut cause = error.source();
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        Self::Error {
            type_name: short_type_name(std::any::type_name::<E>()),
            message,
            code: None,
            stack: None,
            source: Some(Arc::new(error)),
        }
    }

    /// Attach a POSIX-style code. No effect on non-instance variants.
    pub fn with_code(mut self, new_code: impl Into<String>) -> Self {
        if let Self::Error { code, .. } = &mut self {
            *code = Some(new_code.into());
        }
        self
    }

    /// Attach a stack trace. No effect on non-instance variants.
    pub fn with_stack(mut self, new_stack: impl Into<String>) -> Self {
        if let Self::Error { stack, .. } = &mut self {
            *stack = Some(new_stack.into());
        }
        self
    }

    /// Whether the raised value is an error instance (or already classified).
    pub fn is_error_instance(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Classified(_))
    }

    pub fn message(&self) -> Option<String> {
        match self {
            Self::Classified(value) => Some(value.message().to_string()),
            Self::Error { message, .. } => Some(message.clone()),
            Self::Message(message) => Some(message.clone()),
            Self::Object(value) => value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| {
                    value
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }),
            Self::Empty => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Error { type_name, .. } => Some(type_name),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<String> {
        match self {
            Self::Error { code, .. } => code.clone(),
            Self::Object(value) => match value.get("code") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::Classified(value) => value.stack(),
            Self::Error { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn take_source(&mut self) -> Option<Arc<dyn std::error::Error + Send + Sync>> {
        match self {
            Self::Error { source, .. } => source.take(),
            _ => None,
        }
    }
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    let mut segments: Vec<&str> = base.rsplit("::").take(2).collect();
    segments.reverse();
    segments.join("::")
}

/// POSIX-style code for an I/O error kind, so the same rules cover both
/// Rust I/O failures and errors reported by external processes.
fn io_error_code(kind: std::io::ErrorKind) -> Option<&'static str> {
    use std::io::ErrorKind;
    match kind {
        ErrorKind::NotFound => Some("ENOENT"),
        ErrorKind::PermissionDenied => Some("EACCES"),
        ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        ErrorKind::ConnectionReset => Some("ECONNRESET"),
        ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
        ErrorKind::NotConnected => Some("ENOTCONN"),
        ErrorKind::AddrInUse => Some("EADDRINUSE"),
        ErrorKind::AddrNotAvailable => Some("EADDRNOTAVAIL"),
        ErrorKind::BrokenPipe => Some("EPIPE"),
        ErrorKind::AlreadyExists => Some("EEXIST"),
        ErrorKind::WouldBlock => Some("EAGAIN"),
        ErrorKind::TimedOut => Some("ETIMEDOUT"),
        ErrorKind::OutOfMemory => Some("ENOMEM"),
        _ => None,
    }
}

impl From<ErrorValue> for RawError {
    fn from(value: ErrorValue) -> Self {
        Self::Classified(value)
    }
}

impl From<std::io::Error> for RawError {
    fn from(error: std::io::Error) -> Self {
        let code = io_error_code(error.kind()).map(str::to_string);
        Self::Error {
            type_name: "io::Error".to_string(),
            message: error.to_string(),
            code,
            stack: None,
            source: Some(Arc::new(error)),
        }
    }
}

impl From<anyhow::Error> for RawError {
    fn from(error: anyhow::Error) -> Self {
        let code = error
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io_error_code(io.kind()))
            .map(str::to_string);
        let backtrace = error.backtrace();
        let stack = (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());
        let message = format!("{error:#}");
        let source: Box<dyn std::error::Error + Send + Sync> = error.into();
        Self::Error {
            type_name: "anyhow::Error".to_string(),
            message,
            code,
            stack,
            source: Some(Arc::from(source)),
        }
    }
}

impl From<tokio::time::error::Elapsed> for RawError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::Error {
            type_name: "Elapsed".to_string(),
            message: format!("operation timed out: {error}"),
            code: Some("ETIMEDOUT".to_string()),
            stack: None,
            source: Some(Arc::new(error)),
        }
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<Value> for RawError {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(message) => Self::Message(message),
            other => Self::Object(other),
        }
    }
}

impl From<()> for RawError {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

//! Two-level error taxonomy.
//!
//! Every failure carries a coarse [`ErrorCategory`] (used to pick a recovery
//! strategy and for UI grouping) and a fine [`ErrorCode`] (used for user
//! messaging and metrics). Severity, suggestions, default retry guidance and
//! user-facing messages are all static per-code tables so that the same code
//! always behaves the same way.

use crate::core_types::value::RetryInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse grouping of failures.
///
/// Use [`ErrorCategory::all()`] when a dense map over every category is needed
/// (metrics pre-populate their counters this way).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Connection, DNS or TLS problems talking to a remote host.
    NetworkError,
    /// An operation ran out of time.
    Timeout,
    /// The browser automation protocol or the browser process misbehaved.
    CdpError,
    /// Missing files, permissions on files, generic filesystem faults.
    FileSystemError,
    /// The caller supplied something unusable.
    InvalidInput,
    /// Memory, disk or descriptor exhaustion.
    ResourceError,
    /// The page could not be rendered.
    RenderingError,
    /// The conversion pipeline failed for an application reason.
    ConversionFailed,
    /// Writing the output artifact failed.
    ExportError,
    /// Host-level faults such as process permissions.
    SystemError,
    /// A programming error surfaced at runtime (type or reference errors).
    RuntimeError,
    /// Nothing more specific could be inferred.
    Unknown,
}

impl ErrorCategory {
    /// Every category, in declaration order.
    pub const fn all() -> [ErrorCategory; 12] {
        [
            Self::NetworkError,
            Self::Timeout,
            Self::CdpError,
            Self::FileSystemError,
            Self::InvalidInput,
            Self::ResourceError,
            Self::RenderingError,
            Self::ConversionFailed,
            Self::ExportError,
            Self::SystemError,
            Self::RuntimeError,
            Self::Unknown,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::CdpError => "CDP_ERROR",
            Self::FileSystemError => "FILE_SYSTEM_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
            Self::ResourceError => "RESOURCE_ERROR",
            Self::RenderingError => "RENDERING_ERROR",
            Self::ConversionFailed => "CONVERSION_FAILED",
            Self::ExportError => "EXPORT_ERROR",
            Self::SystemError => "SYSTEM_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a failure.
///
/// Severity decides the log level (see [`crate::logging::LogLevel::for_severity`])
/// and never decides whether a retry happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a raised failure most likely originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSource {
    /// Operating system or process level failure.
    System,
    /// Network stack failure.
    Network,
    /// Browser automation protocol failure.
    Protocol,
    /// Script runtime failure (type/reference errors).
    ScriptRuntime,
    /// Filesystem failure.
    FileSystem,
    /// Invalid data supplied by the user.
    UserInput,
    /// An error instance nothing more specific matched.
    Application,
    /// A raised value that is not even an error instance.
    Unknown,
}

impl ErrorSource {
    /// Every source, in declaration order.
    pub const fn all() -> [ErrorSource; 8] {
        [
            Self::System,
            Self::Network,
            Self::Protocol,
            Self::ScriptRuntime,
            Self::FileSystem,
            Self::UserInput,
            Self::Application,
            Self::Unknown,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Network => "NETWORK",
            Self::Protocol => "PROTOCOL",
            Self::ScriptRuntime => "SCRIPT_RUNTIME",
            Self::FileSystem => "FILE_SYSTEM",
            Self::UserInput => "USER_INPUT",
            Self::Application => "APPLICATION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specific, user-facing failure identifier.
///
/// | Code family | Category | Retryable by default |
/// |-------------|----------|----------------------|
/// | `Network*` | NetworkError / Timeout | Yes (except SSL) |
/// | `Cdp*`, `BrowserLaunchFailed` | CdpError / Timeout | Yes |
/// | `File*` | FileSystemError | Only the generic code |
/// | `InvalidInput`, `MalformedInput`, `InvalidUrl` | InvalidInput | No |
/// | `OutOfMemory`, `MemoryLimitExceeded`, `ResourceExhausted`, `DiskFull` | ResourceError | Yes (except disk full) |
/// | `PermissionDenied`, `SystemFailure`, `RecoveryFailed` | SystemError | No |
/// | `ScriptRuntimeError` | RuntimeError | No |
/// | `RenderingFailed`, `ExportFailed` | RenderingError / ExportError | Yes |
/// | `ConversionFailed`, `UnknownError` | ConversionFailed / Unknown | No |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NetworkTimeout,
    NetworkConnectionFailed,
    NetworkDnsError,
    NetworkSslError,
    CdpConnectionFailed,
    CdpTargetNotFound,
    CdpSessionClosed,
    CdpProtocolError,
    CdpTimeout,
    BrowserLaunchFailed,
    FileNotFound,
    FileAccessDenied,
    FileSystemError,
    DiskFull,
    InvalidInput,
    MalformedInput,
    InvalidUrl,
    OutOfMemory,
    MemoryLimitExceeded,
    ResourceExhausted,
    PermissionDenied,
    SystemFailure,
    ScriptRuntimeError,
    RenderingFailed,
    ExportFailed,
    ConversionFailed,
    RecoveryFailed,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::NetworkConnectionFailed => "NETWORK_CONNECTION_FAILED",
            Self::NetworkDnsError => "NETWORK_DNS_ERROR",
            Self::NetworkSslError => "NETWORK_SSL_ERROR",
            Self::CdpConnectionFailed => "CDP_CONNECTION_FAILED",
            Self::CdpTargetNotFound => "CDP_TARGET_NOT_FOUND",
            Self::CdpSessionClosed => "CDP_SESSION_CLOSED",
            Self::CdpProtocolError => "CDP_PROTOCOL_ERROR",
            Self::CdpTimeout => "CDP_TIMEOUT",
            Self::BrowserLaunchFailed => "BROWSER_LAUNCH_FAILED",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::FileAccessDenied => "FILE_ACCESS_DENIED",
            Self::FileSystemError => "FILE_SYSTEM_ERROR",
            Self::DiskFull => "DISK_FULL",
            Self::InvalidInput => "INVALID_INPUT",
            Self::MalformedInput => "MALFORMED_INPUT",
            Self::InvalidUrl => "INVALID_URL",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::MemoryLimitExceeded => "MEMORY_LIMIT_EXCEEDED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::SystemFailure => "SYSTEM_FAILURE",
            Self::ScriptRuntimeError => "SCRIPT_RUNTIME_ERROR",
            Self::RenderingFailed => "RENDERING_FAILED",
            Self::ExportFailed => "EXPORT_FAILED",
            Self::ConversionFailed => "CONVERSION_FAILED",
            Self::RecoveryFailed => "RECOVERY_FAILED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Category this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NetworkTimeout | Self::CdpTimeout => ErrorCategory::Timeout,
            Self::NetworkConnectionFailed | Self::NetworkDnsError | Self::NetworkSslError => {
                ErrorCategory::NetworkError
            }
            Self::CdpConnectionFailed
            | Self::CdpTargetNotFound
            | Self::CdpSessionClosed
            | Self::CdpProtocolError
            | Self::BrowserLaunchFailed => ErrorCategory::CdpError,
            Self::FileNotFound | Self::FileAccessDenied | Self::FileSystemError => {
                ErrorCategory::FileSystemError
            }
            Self::InvalidInput | Self::MalformedInput | Self::InvalidUrl => {
                ErrorCategory::InvalidInput
            }
            Self::DiskFull
            | Self::OutOfMemory
            | Self::MemoryLimitExceeded
            | Self::ResourceExhausted => ErrorCategory::ResourceError,
            Self::PermissionDenied | Self::SystemFailure | Self::RecoveryFailed => {
                ErrorCategory::SystemError
            }
            Self::ScriptRuntimeError => ErrorCategory::RuntimeError,
            Self::RenderingFailed => ErrorCategory::RenderingError,
            Self::ExportFailed => ErrorCategory::ExportError,
            Self::ConversionFailed => ErrorCategory::ConversionFailed,
            Self::UnknownError => ErrorCategory::Unknown,
        }
    }

    /// Severity this code is reported with.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidInput | Self::MalformedInput | Self::InvalidUrl => ErrorSeverity::Low,
            Self::NetworkTimeout
            | Self::CdpTargetNotFound
            | Self::CdpSessionClosed
            | Self::CdpProtocolError
            | Self::CdpTimeout
            | Self::FileNotFound
            | Self::FileSystemError
            | Self::RenderingFailed
            | Self::ExportFailed
            | Self::ConversionFailed
            | Self::UnknownError => ErrorSeverity::Medium,
            Self::NetworkConnectionFailed
            | Self::NetworkDnsError
            | Self::NetworkSslError
            | Self::CdpConnectionFailed
            | Self::FileAccessDenied
            | Self::ResourceExhausted
            | Self::PermissionDenied
            | Self::SystemFailure
            | Self::ScriptRuntimeError
            | Self::RecoveryFailed => ErrorSeverity::High,
            Self::BrowserLaunchFailed
            | Self::DiskFull
            | Self::OutOfMemory
            | Self::MemoryLimitExceeded => ErrorSeverity::Critical,
        }
    }

    /// Initial retry guidance attached by the classifier.
    ///
    /// Transient network, protocol and resource failures are retryable with a
    /// bounded budget; validation, permission and runtime failures are not.
    pub fn default_retry(&self) -> RetryInfo {
        match self {
            Self::NetworkTimeout | Self::NetworkConnectionFailed | Self::CdpTimeout => {
                RetryInfo::retryable(3, 1000)
            }
            Self::NetworkDnsError | Self::CdpConnectionFailed => RetryInfo::retryable(2, 2000),
            Self::CdpTargetNotFound | Self::CdpSessionClosed | Self::CdpProtocolError => {
                RetryInfo::retryable(2, 1000)
            }
            Self::BrowserLaunchFailed => RetryInfo::retryable(1, 5000),
            Self::FileSystemError => RetryInfo::retryable(1, 500),
            Self::OutOfMemory | Self::MemoryLimitExceeded | Self::RenderingFailed => {
                RetryInfo::retryable(2, 2000)
            }
            Self::ResourceExhausted => RetryInfo::retryable(3, 1000),
            Self::ExportFailed => RetryInfo::retryable(1, 1000),
            Self::NetworkSslError
            | Self::FileNotFound
            | Self::FileAccessDenied
            | Self::DiskFull
            | Self::InvalidInput
            | Self::MalformedInput
            | Self::InvalidUrl
            | Self::PermissionDenied
            | Self::SystemFailure
            | Self::ScriptRuntimeError
            | Self::ConversionFailed
            | Self::RecoveryFailed
            | Self::UnknownError => RetryInfo::not_retryable(),
        }
    }

    /// Memory-pressure codes get a fixed-delay strategy regardless of category.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, Self::OutOfMemory | Self::MemoryLimitExceeded)
    }

    /// Static recovery suggestions shown to operators and users.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::NetworkTimeout => &[
                "Check network connectivity",
                "Increase the operation timeout",
                "Retry the request later",
            ],
            Self::NetworkConnectionFailed => &[
                "Verify the target host is reachable",
                "Check that the browser debugging port is open",
                "Check firewall and proxy settings",
            ],
            Self::NetworkDnsError => &[
                "Verify the host name is spelled correctly",
                "Check DNS resolver configuration",
            ],
            Self::NetworkSslError => &[
                "Verify the server certificate is valid",
                "Check the system clock",
            ],
            Self::CdpConnectionFailed => &[
                "Ensure the browser process is running",
                "Check the remote debugging endpoint",
            ],
            Self::CdpTargetNotFound => &[
                "The page or tab was closed; open a new target",
                "Avoid reusing targets across conversions",
            ],
            Self::CdpSessionClosed => &[
                "Reconnect to the browser",
                "Restart the browser process if the problem persists",
            ],
            Self::CdpProtocolError => &[
                "Check browser and protocol version compatibility",
                "Restart the browser process",
            ],
            Self::CdpTimeout => &[
                "Increase the protocol command timeout",
                "Reduce page complexity",
            ],
            Self::BrowserLaunchFailed => &[
                "Verify the browser executable path",
                "Check that required system libraries are installed",
            ],
            Self::FileNotFound => &[
                "Verify the file path exists",
                "Check the working directory",
            ],
            Self::FileAccessDenied => &[
                "Check file permissions",
                "Run with a user that can access the path",
            ],
            Self::FileSystemError => &["Check the filesystem health", "Retry the operation"],
            Self::DiskFull => &["Free disk space", "Write output to a different volume"],
            Self::InvalidInput => &[
                "Check the input parameters",
                "Consult the usage documentation",
            ],
            Self::MalformedInput => &[
                "Validate the document format",
                "Check the input encoding",
            ],
            Self::InvalidUrl => &[
                "Provide an absolute URL including the scheme",
                "Check the URL for typos",
            ],
            Self::OutOfMemory => &[
                "Clear caches before retrying",
                "Process smaller documents",
                "Increase available memory",
            ],
            Self::MemoryLimitExceeded => &[
                "Raise the memory limit",
                "Split the document into smaller parts",
            ],
            Self::ResourceExhausted => &[
                "Reduce concurrent conversions",
                "Raise the open file limit",
            ],
            Self::PermissionDenied => &[
                "Check process permissions",
                "Avoid running in a restricted sandbox",
            ],
            Self::SystemFailure => &["Check system logs", "Restart the service"],
            Self::ScriptRuntimeError => &[
                "Report this as a bug",
                "Check the page scripts for errors",
            ],
            Self::RenderingFailed => &[
                "Retry without script execution",
                "Simplify the page content",
            ],
            Self::ExportFailed => &[
                "Try an alternate output format",
                "Check the output destination",
            ],
            Self::ConversionFailed => &["Check the input document", "Retry the conversion"],
            Self::RecoveryFailed => &["Inspect the logs for the original failure"],
            Self::UnknownError => &["Check the logs for details"],
        }
    }

    /// User-safe message; never contains request data.
    pub fn user_message(&self) -> &'static str {
        match self.category() {
            ErrorCategory::NetworkError => "Unable to reach the requested resource",
            ErrorCategory::Timeout => "The operation timed out. Please try again",
            ErrorCategory::CdpError => "The rendering browser is not responding correctly",
            ErrorCategory::FileSystemError => "A file could not be read or written",
            ErrorCategory::InvalidInput => "The input is invalid. Please check it and try again",
            ErrorCategory::ResourceError => "The system ran out of resources",
            ErrorCategory::RenderingError => "The document could not be rendered",
            ErrorCategory::ConversionFailed => "The document could not be converted",
            ErrorCategory::ExportError => "The converted output could not be saved",
            ErrorCategory::SystemError => "A system error occurred",
            ErrorCategory::RuntimeError => "An internal error occurred",
            ErrorCategory::Unknown => "An unexpected error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

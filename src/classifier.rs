//! Rule-based error classification.
//!
//! Raised failures are matched against an ordered table of
//! [`ClassificationRule`]s, evaluated top to bottom; the first rule whose
//! predicate matches decides the [`ErrorSource`] and resolves the specific
//! [`ErrorCode`]. Category, severity, suggestions and default retry guidance
//! then come from the code's static tables. Inputs no rule matches fall back
//! to `APPLICATION` (error instances) or `UNKNOWN` (anything else).
//!
//! Default rule order:
//!
//! | # | Rule | Source | Matches |
//! |---|------|--------|---------|
//! | 1 | `user_input` | UserInput | "invalid input"/"invalid format", or a `TypeError` mentioning invalid/input |
//! | 2 | `script_runtime` | ScriptRuntime | `TypeError` / `ReferenceError` instances |
//! | 3 | `protocol` | Protocol | message or stack mentions the browser, the protocol or a websocket |
//! | 4 | `network` | Network | connection refused, host not found, timeouts, http/fetch |
//! | 5 | `file_system` | FileSystem | not found, access denied, file/path/directory/disk |
//! | 6 | `system` | System | error instances mentioning system/process/permission/memory |

use crate::core_types::{
    ErrorCategory, ErrorCode, ErrorContext, ErrorSeverity, ErrorSource, ErrorValue, RawError,
    RetryInfo,
};
use crate::logging::log_debug;
use serde::Serialize;
use serde_json::json;

/// Message used when a raised value carries no message at all.
pub const DEFAULT_MESSAGE: &str = "An unknown error occurred";

/// Lower-cased view of a raised value that rules match against.
#[derive(Debug, Clone)]
pub struct Evidence {
    message: String,
    stack: String,
    type_name: String,
    code: String,
    is_error: bool,
}

impl Evidence {
    pub fn from_raw(raw: &RawError) -> Self {
        Self {
            message: raw.message().unwrap_or_default().to_lowercase(),
            stack: raw.stack().unwrap_or_default().to_lowercase(),
            type_name: raw.type_name().unwrap_or_default().to_string(),
            code: raw.code().unwrap_or_default().to_lowercase(),
            is_error: raw.is_error_instance(),
        }
    }

    /// Message or code contains any of the (lower-case) needles.
    pub fn mentions(&self, needles: &[&str]) -> bool {
        needles
            .iter()
            .any(|n| self.message.contains(n) || (!self.code.is_empty() && self.code.contains(n)))
    }

    /// Stack trace contains any of the (lower-case) needles.
    pub fn stack_mentions(&self, needles: &[&str]) -> bool {
        !self.stack.is_empty() && needles.iter().any(|n| self.stack.contains(n))
    }

    /// Type name ends with `suffix`, e.g. `TypeError`.
    pub fn type_is(&self, suffix: &str) -> bool {
        self.type_name.ends_with(suffix)
    }

    pub fn is_error_instance(&self) -> bool {
        self.is_error
    }
}

/// Resolved code plus whether it was a specific match or the rule's generic fallback.
pub type Resolution = (ErrorCode, bool);

/// One row of the classification table.
#[derive(Clone, Copy)]
pub struct ClassificationRule {
    pub name: &'static str,
    pub source: ErrorSource,
    /// Confidence reported for a specific match; generic fallbacks report less.
    pub confidence: f64,
    matches: fn(&Evidence) -> bool,
    resolve: fn(&Evidence) -> Resolution,
}

impl ClassificationRule {
    pub const fn new(
        name: &'static str,
        source: ErrorSource,
        confidence: f64,
        matches: fn(&Evidence) -> bool,
        resolve: fn(&Evidence) -> Resolution,
    ) -> Self {
        Self {
            name,
            source,
            confidence,
            matches,
            resolve,
        }
    }

    pub fn matches(&self, evidence: &Evidence) -> bool {
        (self.matches)(evidence)
    }

    pub fn resolve(&self, evidence: &Evidence) -> Resolution {
        (self.resolve)(evidence)
    }
}

impl std::fmt::Debug for ClassificationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationRule")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("confidence", &self.confidence)
            .finish_non_exhaustive()
    }
}

/// Outcome of classifying one raised value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub rule: &'static str,
    pub source: ErrorSource,
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    /// Informational only; never used for control flow.
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub retry_info: RetryInfo,
}

impl Classification {
    fn for_code(rule: &'static str, source: ErrorSource, code: ErrorCode, confidence: f64) -> Self {
        Self {
            rule,
            source,
            code,
            category: code.category(),
            severity: code.severity(),
            confidence,
            suggestions: code.suggestions().iter().map(|s| s.to_string()).collect(),
            retry_info: code.default_retry(),
        }
    }

    fn for_value(value: &ErrorValue) -> Self {
        Self {
            rule: "already_classified",
            source: value.origin(),
            code: value.code(),
            category: value.category(),
            severity: value.severity(),
            confidence: 1.0,
            suggestions: value.context().suggestions.clone(),
            retry_info: value
                .context()
                .retry_info
                .unwrap_or_else(|| value.code().default_retry()),
        }
    }
}

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Classifier with the default rule table.
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Classifier with a caller-supplied table (fallbacks still apply).
    pub fn with_rules(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Insert a rule at `index` (clamped to the table length).
    pub fn insert_rule(&mut self, index: usize, rule: ClassificationRule) {
        let index = index.min(self.rules.len());
        self.rules.insert(index, rule);
    }

    /// Append a rule after the existing ones, ahead of the fallbacks.
    pub fn push_rule(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
    }

    /// Evaluate the table without building an [`ErrorValue`].
    pub fn evaluate(&self, raw: &RawError) -> Classification {
        if let RawError::Classified(value) = raw {
            return Classification::for_value(value);
        }

        let evidence = Evidence::from_raw(raw);
        for rule in &self.rules {
            if rule.matches(&evidence) {
                let (code, specific) = rule.resolve(&evidence);
                let confidence = if specific {
                    rule.confidence
                } else {
                    (rule.confidence - 0.15).max(0.0)
                };
                return Classification::for_code(rule.name, rule.source, code, confidence);
            }
        }

        if evidence.is_error_instance() {
            let (code, specific) = application_code(&evidence);
            let confidence = if specific { 0.6 } else { 0.55 };
            Classification::for_code("application", ErrorSource::Application, code, confidence)
        } else {
            Classification::for_code("unknown", ErrorSource::Unknown, ErrorCode::UnknownError, 0.5)
        }
    }

    /// Normalize a raised value into an [`ErrorValue`].
    ///
    /// `hint` is merged into the resulting context: its suggestions come
    /// first and its retry info, when present, overrides the default.
    /// Already classified values keep their taxonomy.
    pub fn classify(&self, mut raw: RawError, hint: ErrorContext) -> (ErrorValue, Classification) {
        let classification = self.evaluate(&raw);

        if let RawError::Classified(mut value) = raw {
            value.merge_context(hint);
            return (value, classification);
        }

        let message = raw
            .message()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        let mut context = hint;
        for suggestion in &classification.suggestions {
            if !context.suggestions.contains(suggestion) {
                context.suggestions.push(suggestion.clone());
            }
        }
        if context.retry_info.is_none() {
            context.retry_info = Some(classification.retry_info);
        }
        context
            .metadata
            .insert("source".to_string(), json!(classification.source));
        context.metadata.insert(
            "classificationConfidence".to_string(),
            json!(classification.confidence),
        );
        context
            .metadata
            .insert("classificationRule".to_string(), json!(classification.rule));
        if let Some(type_name) = raw.type_name() {
            context
                .metadata
                .insert("errorType".to_string(), json!(type_name));
        }
        if let Some(code) = raw.code() {
            context.metadata.insert("rawCode".to_string(), json!(code));
        }
        if let RawError::Object(payload) = &raw {
            context
                .metadata
                .insert("rawValue".to_string(), payload.clone());
        }

        let stack = raw.stack().map(str::to_string);
        let mut value = ErrorValue::with_taxonomy(
            classification.code,
            classification.category,
            classification.severity,
            message,
        )
        .with_origin(classification.source)
        .with_context(context);
        if let Some(original) = raw.take_source() {
            value = value.with_original(original);
        }
        if let Some(stack) = stack {
            value = value.with_stack(stack);
        }

        log_debug!(
            rule = classification.rule,
            source = %classification.source,
            code = %classification.code,
            confidence = classification.confidence,
            "Classified raised error"
        );

        (value, classification)
    }
}

fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new("user_input", ErrorSource::UserInput, 0.9, is_user_input, user_input_code),
        ClassificationRule::new(
            "script_runtime",
            ErrorSource::ScriptRuntime,
            0.95,
            is_script_runtime,
            |_| (ErrorCode::ScriptRuntimeError, true),
        ),
        ClassificationRule::new("protocol", ErrorSource::Protocol, 0.9, is_protocol, protocol_code),
        ClassificationRule::new("network", ErrorSource::Network, 0.9, is_network, network_code),
        ClassificationRule::new(
            "file_system",
            ErrorSource::FileSystem,
            0.85,
            is_file_system,
            file_system_code,
        ),
        ClassificationRule::new("system", ErrorSource::System, 0.8, is_system, system_code),
    ]
}

const TIMEOUT_WORDS: &[&str] = &["timeout", "timed out", "etimedout", "deadline has elapsed"];
const DNS_WORDS: &[&str] = &["dns", "enotfound", "eai_again", "getaddrinfo", "host not found"];

fn is_user_input(e: &Evidence) -> bool {
    e.mentions(&["invalid input", "invalid format"])
        || (e.type_is("TypeError") && e.mentions(&["invalid", "input"]))
}

fn user_input_code(e: &Evidence) -> Resolution {
    if e.mentions(&["malformed", "invalid format", "parse", "syntax"]) {
        (ErrorCode::MalformedInput, true)
    } else if e.mentions(&["url", "uri"]) {
        (ErrorCode::InvalidUrl, true)
    } else {
        (ErrorCode::InvalidInput, false)
    }
}

fn is_script_runtime(e: &Evidence) -> bool {
    e.type_is("TypeError") || e.type_is("ReferenceError")
}

const PROTOCOL_WORDS: &[&str] = &[
    "cdp",
    "devtools",
    "protocol error",
    "target closed",
    "session closed",
    "websocket",
    "browser",
    "chrom",
];

fn is_protocol(e: &Evidence) -> bool {
    e.mentions(PROTOCOL_WORDS) || e.stack_mentions(PROTOCOL_WORDS)
}

fn protocol_code(e: &Evidence) -> Resolution {
    if e.mentions(&["launch", "spawn", "executable"]) {
        (ErrorCode::BrowserLaunchFailed, true)
    } else if e.mentions(&["no target", "cannot find context"])
        || (e.mentions(&["target"]) && e.mentions(&["not found"]))
    {
        (ErrorCode::CdpTargetNotFound, true)
    } else if e.mentions(&["target closed", "session closed", "connection closed", "not open"]) {
        (ErrorCode::CdpSessionClosed, true)
    } else if e.mentions(TIMEOUT_WORDS) {
        (ErrorCode::CdpTimeout, true)
    } else if e.mentions(&["econnrefused", "websocket", "connect"]) {
        (ErrorCode::CdpConnectionFailed, true)
    } else {
        (ErrorCode::CdpProtocolError, false)
    }
}

fn is_network(e: &Evidence) -> bool {
    e.mentions(&[
        "econnrefused",
        "econnreset",
        "econnaborted",
        "connection refused",
        "connection reset",
        "socket hang up",
        "network",
        "http",
        "fetch",
        "ssl",
        "tls",
        "certificate",
    ]) || e.mentions(DNS_WORDS)
        || e.mentions(TIMEOUT_WORDS)
}

fn network_code(e: &Evidence) -> Resolution {
    if e.mentions(DNS_WORDS) {
        (ErrorCode::NetworkDnsError, true)
    } else if e.mentions(TIMEOUT_WORDS) {
        (ErrorCode::NetworkTimeout, true)
    } else if e.mentions(&["ssl", "tls", "certificate"]) {
        (ErrorCode::NetworkSslError, true)
    } else {
        (ErrorCode::NetworkConnectionFailed, false)
    }
}

fn is_file_system(e: &Evidence) -> bool {
    e.mentions(&[
        "enoent",
        "eacces",
        "eisdir",
        "enotdir",
        "enospc",
        "eexist",
        "no such file",
        "not found",
        "access denied",
        "no space left",
        "file",
        "path",
        "directory",
        "disk",
    ])
}

fn file_system_code(e: &Evidence) -> Resolution {
    if e.mentions(&["enospc", "no space left", "disk full"]) {
        (ErrorCode::DiskFull, true)
    } else if e.mentions(&["enoent", "no such file", "not found"]) {
        (ErrorCode::FileNotFound, true)
    } else if e.mentions(&["eacces", "eperm", "access denied", "permission"]) {
        (ErrorCode::FileAccessDenied, true)
    } else {
        (ErrorCode::FileSystemError, false)
    }
}

fn is_system(e: &Evidence) -> bool {
    e.is_error_instance()
        && e.mentions(&[
            "system",
            "process",
            "permission",
            "eperm",
            "memory",
            "heap",
            "enomem",
            "emfile",
            "too many open files",
        ])
}

fn system_code(e: &Evidence) -> Resolution {
    if e.mentions(&["heap limit", "memory limit"]) {
        (ErrorCode::MemoryLimitExceeded, true)
    } else if e.mentions(&["memory", "heap", "enomem"]) {
        (ErrorCode::OutOfMemory, true)
    } else if e.mentions(&["emfile", "too many open files"]) {
        (ErrorCode::ResourceExhausted, true)
    } else if e.mentions(&["permission", "eperm"]) {
        (ErrorCode::PermissionDenied, true)
    } else {
        (ErrorCode::SystemFailure, false)
    }
}

fn application_code(e: &Evidence) -> Resolution {
    if e.mentions(&["render", "layout", "paint"]) {
        (ErrorCode::RenderingFailed, true)
    } else if e.mentions(&["export", "pdf", "archive", "write output"]) {
        (ErrorCode::ExportFailed, true)
    } else {
        (ErrorCode::ConversionFailed, false)
    }
}

//! Diagnostic enrichment of classified errors.
//!
//! [`ContextEnricher`] only touches the [`ErrorContext`]; code, category and
//! severity are left as the classifier set them. In order, it:
//! 1. assigns a correlation id when none is present
//! 2. turns `metadata.startTime` into `metadata.duration` (milliseconds)
//! 3. optionally attaches a coarse [`SystemSnapshot`]
//! 4. attaches a bounded [`StackAnalysis`] when the error has a stack
//! 5. redacts the resource and every metadata entry

use crate::clock::Clock;
use crate::config::EnricherConfig;
use crate::core_types::{ErrorContext, ErrorValue};
use crate::logging::log_trace;
use crate::sanitize::{sanitize_map, sanitize_text};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Metadata key callers set (epoch milliseconds or RFC 3339) to get a duration.
pub const START_TIME_KEY: &str = "startTime";
/// Metadata key the computed duration in milliseconds is written to.
pub const DURATION_KEY: &str = "duration";
pub const SYSTEM_KEY: &str = "system";
pub const STACK_ANALYSIS_KEY: &str = "stackAnalysis";

// `1: crate::module::function` as printed by std backtraces
static NUMBERED_FRAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*\d+:\s+(?P<func>\S.*?)\s*$").ok());

// `at func (file:line:col)`, `at file:line:col`
static LOCATION_FRAME: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^\s*at\s+(?:(?P<func>[^()]+?)\s+\()?(?P<file>[^()\s]+?):\d+(?::\d+)?\)?\s*$",
    )
    .ok()
});

/// Coarse host snapshot attached when enabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub platform: &'static str,
    pub arch: &'static str,
    pub pid: u32,
    pub available_parallelism: Option<usize>,
    /// Resident set size, when the platform exposes it.
    pub resident_memory_bytes: Option<u64>,
}

impl SystemSnapshot {
    pub fn capture() -> Self {
        Self {
            platform: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            pid: std::process::id(),
            available_parallelism: std::thread::available_parallelism()
                .ok()
                .map(|n| n.get()),
            resident_memory_bytes: resident_memory_bytes(),
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    // statm reports pages; assume the common 4 KiB page size
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

/// Markers found anywhere in the analyzed frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StackPatterns {
    #[serde(rename = "async")]
    pub async_frames: bool,
    pub promise: bool,
    pub timer: bool,
    pub module: bool,
}

/// Summary of a stack trace, bounded to a configured number of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackAnalysis {
    pub total_frames: usize,
    /// Distinct function names, in frame order.
    pub functions: Vec<String>,
    /// Distinct source files, in frame order.
    pub files: Vec<String>,
    pub patterns: StackPatterns,
}

#[derive(Debug, Default)]
struct Frame {
    function: Option<String>,
    file: Option<String>,
    numbered: bool,
    text: String,
}

impl StackAnalysis {
    /// Analyze at most `max_frames` frames of `stack`.
    ///
    /// Understands script-engine frames (`at fn (file:line:col)`) and std
    /// backtraces (`N: fn` followed by `at file:line:col`). Lines that look
    /// like neither, such as the message header, are skipped.
    pub fn analyze(stack: &str, max_frames: usize) -> Self {
        let (Some(numbered), Some(location)) = (NUMBERED_FRAME.as_ref(), LOCATION_FRAME.as_ref())
        else {
            return Self::default();
        };

        let mut frames: Vec<Frame> = Vec::new();
        for line in stack.lines() {
            if let Some(caps) = numbered.captures(line) {
                if frames.len() == max_frames {
                    break;
                }
                frames.push(Frame {
                    function: caps.name("func").map(|m| m.as_str().to_string()),
                    file: None,
                    numbered: true,
                    text: line.to_lowercase(),
                });
            } else if let Some(caps) = location.captures(line) {
                let file = caps.name("file").map(|m| m.as_str().to_string());
                match frames.last_mut() {
                    Some(last) if last.numbered && last.file.is_none() => {
                        last.file = file;
                        last.text.push_str(&line.to_lowercase());
                    }
                    _ => {
                        if frames.len() == max_frames {
                            break;
                        }
                        frames.push(Frame {
                            function: caps.name("func").map(|m| m.as_str().trim().to_string()),
                            file,
                            numbered: false,
                            text: line.to_lowercase(),
                        });
                    }
                }
            }
        }

        let mut analysis = Self {
            total_frames: frames.len(),
            ..Self::default()
        };
        for frame in &frames {
            if let Some(function) = &frame.function {
                if !analysis.functions.contains(function) {
                    analysis.functions.push(function.clone());
                }
            }
            if let Some(file) = &frame.file {
                if !analysis.files.contains(file) {
                    analysis.files.push(file.clone());
                }
            }
            let text = frame.text.as_str();
            analysis.patterns.async_frames |= text.contains("async") || text.contains("{{closure}}");
            analysis.patterns.promise |= text.contains("promise") || text.contains("future");
            analysis.patterns.timer |= ["settimeout", "setinterval", "timer", "sleep"]
                .iter()
                .any(|needle| text.contains(needle));
            analysis.patterns.module |= ["node_modules", "internal/modules", ".cargo/registry", "/rustc/"]
                .iter()
                .any(|needle| text.contains(needle));
        }
        analysis
    }
}

/// Adds correlation, timing and stack diagnostics to an error's context.
#[derive(Debug, Clone)]
pub struct ContextEnricher {
    config: EnricherConfig,
    clock: Arc<dyn Clock>,
}

impl ContextEnricher {
    pub fn new(config: EnricherConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &EnricherConfig {
        &self.config
    }

    /// Enrich `error` in place of its context.
    pub fn enrich(&self, mut error: ErrorValue) -> ErrorValue {
        let context = self.enrich_context(&error);
        error.replace_context(context);
        error
    }

    /// Enriched copy of `error`'s context.
    pub fn enrich_context(&self, error: &ErrorValue) -> ErrorContext {
        let mut context = error.context().clone();

        if context.correlation_id.is_none() {
            context.correlation_id = Some(Uuid::new_v4().to_string());
        }

        if let Some(start) = context.metadata.get(START_TIME_KEY).and_then(parse_start_time) {
            let elapsed_ms = (self.clock.now() - start).num_milliseconds().max(0);
            context.metadata.insert(DURATION_KEY.to_string(), json!(elapsed_ms));
        }

        if self.config.include_system_snapshot {
            context
                .metadata
                .insert(SYSTEM_KEY.to_string(), json!(SystemSnapshot::capture()));
        }

        if let Some(stack) = error.stack() {
            let analysis = StackAnalysis::analyze(stack, self.config.max_stack_frames);
            context
                .metadata
                .insert(STACK_ANALYSIS_KEY.to_string(), json!(analysis));
        }

        context
            .metadata
            .entry("source".to_string())
            .or_insert_with(|| json!(error.origin()));

        context.resource = context.resource.as_deref().map(sanitize_text);
        context.metadata = sanitize_map(std::mem::take(&mut context.metadata));

        log_trace!(
            code = %error.code(),
            correlation_id = context.correlation_id.as_deref().unwrap_or_default(),
            "Enriched error context"
        );
        context
    }
}

fn parse_start_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

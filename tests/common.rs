//! Test helper utilities for render-recovery integration tests
//!
//! This module provides reusable fixtures shared across the integration test
//! files: a log sink that records what the handler reports, fixed clocks and
//! scripted operations.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use render_recovery::{
    ErrorHandler, ErrorHandlerConfig, LogLevel, LogSink, ManualClock, RawError,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Connection failure message the classifier maps to NETWORK_CONNECTION_FAILED.
pub const REFUSED: &str = "connect ECONNREFUSED 127.0.0.1:9222";

/// Protocol failure message the classifier maps to CDP_SESSION_CLOSED.
pub const SESSION_CLOSED: &str = "Protocol error (Target.attachToTarget): Target closed.";

/// One entry captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct LoggedEntry {
    pub level: LogLevel,
    pub message: String,
    pub fields: Map<String, Value>,
}

/// Sink that keeps every entry in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<LoggedEntry>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<LoggedEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn levels(&self) -> Vec<LogLevel> {
        self.entries().into_iter().map(|e| e.level).collect()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, message: &str, context: &Map<String, Value>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LoggedEntry {
                level,
                message: message.to_string(),
                fields: context.clone(),
            });
    }
}

/// 2024-01-01T00:00:00Z
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Handler wired to a manual clock and a recording sink.
///
/// # Panics
///
/// Panics if `config` does not validate.
pub fn test_handler(
    config: ErrorHandlerConfig,
) -> (ErrorHandler, Arc<ManualClock>, Arc<RecordingSink>) {
    let clock = Arc::new(ManualClock::new(epoch()));
    let sink = Arc::new(RecordingSink::default());
    let handler = ErrorHandler::builder()
        .with_config(config)
        .with_clock(clock.clone())
        .with_sink(sink.clone())
        .build()
        .expect("test config should be valid");
    (handler, clock, sink)
}

/// Operation that always fails with `message`; returns its call counter.
pub fn failing_operation(
    message: &'static str,
) -> (
    Arc<AtomicU32>,
    impl Fn() -> std::future::Ready<Result<String, RawError>>,
) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let operation = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Err(RawError::error("Error", message)))
    };
    (calls, operation)
}

pub fn calls(counter: &AtomicU32) -> u32 {
    counter.load(Ordering::SeqCst)
}

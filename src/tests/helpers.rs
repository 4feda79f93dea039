//! Test helper utilities
//!
//! Shared fixtures for the unit test modules: a fixed clock, canonical errors
//! and scripted operations that fail a set number of times.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

use crate::clock::ManualClock;
use crate::core_types::{ErrorCode, ErrorContext, ErrorValue, RawError};
use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// 2024-01-01T00:00:00Z, the start of every fixed clock.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn fixed_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(epoch()))
}

/// Error with `code` scoped to `operation`, as the classifier would leave it.
pub fn error_for(code: ErrorCode, operation: &str) -> ErrorValue {
    ErrorValue::new(code, format!("{code} during {operation}"))
        .with_context(ErrorContext::for_operation(operation).with_retry_info(code.default_retry()))
}

/// Raw error instance, the way an operation would raise it.
pub fn raw_error(message: &str) -> RawError {
    RawError::error("Error", message)
}

pub type ScriptedResult = BoxFuture<'static, Result<&'static str, RawError>>;

/// Operation that fails with `message` for the first `failures` calls, then
/// succeeds with `value`. Returns the call counter alongside.
pub fn flaky_operation(
    failures: u32,
    message: &'static str,
    value: &'static str,
) -> (Arc<AtomicU32>, impl Fn() -> ScriptedResult) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let operation = move || {
        let counter = Arc::clone(&counter);
        async move {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= failures {
                Err(raw_error(message))
            } else {
                Ok(value)
            }
        }
        .boxed()
    };
    (calls, operation)
}

pub fn calls(counter: &AtomicU32) -> u32 {
    counter.load(Ordering::SeqCst)
}

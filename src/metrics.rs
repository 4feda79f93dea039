//! Aggregate error metrics.
//!
//! Category and source counters are dense: every known value is present,
//! starting at zero, so dashboards never see missing keys. The recovery success
//! rate is an exponentially weighted average with a 0.1 weight per attempt.

use crate::clock::Clock;
use crate::core_types::{ErrorCategory, ErrorCode, ErrorSource, ErrorValue};
use crate::logging::log_debug;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Length of the frequent error list.
pub const TOP_ERRORS: usize = 10;

const RATE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequentError {
    pub code: ErrorCode,
    pub count: u64,
    pub last_occurred: DateTime<Utc>,
}

/// JSON-serializable metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMetrics {
    pub total_errors: u64,
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,
    pub errors_by_source: BTreeMap<ErrorSource, u64>,
    /// Most frequent codes, by count descending, most recent first on ties.
    pub frequent_errors: Vec<FrequentError>,
    pub recovery_success_rate: f64,
    pub recovery_attempts: u64,
}

#[derive(Debug)]
struct MetricsState {
    total_errors: u64,
    by_category: BTreeMap<ErrorCategory, u64>,
    by_source: BTreeMap<ErrorSource, u64>,
    by_code: HashMap<ErrorCode, (u64, DateTime<Utc>)>,
    recovery_success_rate: f64,
    recovery_attempts: u64,
}

impl MetricsState {
    fn new() -> Self {
        Self {
            total_errors: 0,
            by_category: ErrorCategory::all().iter().map(|c| (*c, 0)).collect(),
            by_source: ErrorSource::all().iter().map(|s| (*s, 0)).collect(),
            by_code: HashMap::new(),
            recovery_success_rate: 0.0,
            recovery_attempts: 0,
        }
    }
}

#[derive(Debug)]
pub struct MetricsAggregator {
    clock: Arc<dyn Clock>,
    state: Mutex<MetricsState>,
}

impl MetricsAggregator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(MetricsState::new()),
        }
    }

    /// Count one handled error.
    pub fn record_error(&self, error: &ErrorValue) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.total_errors += 1;
        *state.by_category.entry(error.category()).or_insert(0) += 1;
        *state.by_source.entry(error.origin()).or_insert(0) += 1;
        let entry = state.by_code.entry(error.code()).or_insert((0, now));
        entry.0 += 1;
        entry.1 = now;
    }

    /// Fold one recovery outcome into the success rate.
    pub fn record_recovery(&self, success: bool) {
        let mut state = self.lock();
        let rate = state.recovery_success_rate;
        state.recovery_success_rate = if success {
            rate + (1.0 - rate) * RATE_WEIGHT
        } else {
            rate * (1.0 - RATE_WEIGHT)
        };
        state.recovery_attempts += 1;
        log_debug!(
            success = success,
            recovery_success_rate = state.recovery_success_rate,
            "Recorded recovery outcome"
        );
    }

    pub fn total_errors(&self) -> u64 {
        self.lock().total_errors
    }

    pub fn snapshot(&self) -> ErrorMetrics {
        let state = self.lock();
        let mut frequent: Vec<FrequentError> = state
            .by_code
            .iter()
            .map(|(code, (count, last))| FrequentError {
                code: *code,
                count: *count,
                last_occurred: *last,
            })
            .collect();
        frequent.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(b.last_occurred.cmp(&a.last_occurred))
                .then(a.code.cmp(&b.code))
        });
        frequent.truncate(TOP_ERRORS);

        ErrorMetrics {
            total_errors: state.total_errors,
            errors_by_category: state.by_category.clone(),
            errors_by_source: state.by_source.clone(),
            frequent_errors: frequent,
            recovery_success_rate: state.recovery_success_rate,
            recovery_attempts: state.recovery_attempts,
        }
    }

    /// Zero every counter; category and source maps stay fully populated.
    pub fn reset(&self) {
        *self.lock() = MetricsState::new();
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

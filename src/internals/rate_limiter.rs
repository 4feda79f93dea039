//! Error budgets per rolling window.
//!
//! Every recorded failure increments the count for its key. Once
//! `window` has passed since the window started, the count goes back to zero
//! before anything is evaluated. A key is limited while its count is at or
//! above `max_errors`.

use crate::clock::{elapsed_between, Clock};
use crate::config::RateLimitConfig;
use crate::logging::log_warn;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Key used for every operation when `per_operation` is off.
pub const GLOBAL_KEY: &str = "global";

#[derive(Debug, Clone)]
struct ErrorWindow {
    errors: u32,
    window_start: DateTime<Utc>,
}

impl ErrorWindow {
    fn roll(&mut self, now: DateTime<Utc>, config: &RateLimitConfig) {
        if elapsed_between(self.window_start, now) >= config.window {
            self.errors = 0;
            self.window_start = now;
        }
    }
}

/// Read-only view of one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub errors: u32,
    pub window_start: DateTime<Utc>,
    pub is_limited: bool,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, ErrorWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Window key for an operation.
    pub fn key_for<'a>(&self, operation: &'a str) -> &'a str {
        if self.config.per_operation {
            operation
        } else {
            GLOBAL_KEY
        }
    }

    /// Count one failure; returns the count in the current window.
    pub fn record_error(&self, operation: &str) -> u32 {
        let key = self.key_for(operation);
        let now = self.clock.now();
        let mut windows = self.lock();
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| ErrorWindow {
                errors: 0,
                window_start: now,
            });
        window.roll(now, &self.config);
        window.errors += 1;

        if window.errors == self.config.max_errors {
            log_warn!(
                rate_limit_key = key,
                errors = window.errors,
                window_ms = self.config.window.as_millis() as u64,
                "Error budget exhausted, suppressing recovery attempts"
            );
        }
        window.errors
    }

    /// Whether recovery for `operation` is currently suppressed.
    pub fn is_limited(&self, operation: &str) -> bool {
        let key = self.key_for(operation);
        let now = self.clock.now();
        let mut windows = self.lock();
        match windows.get_mut(key) {
            Some(window) => {
                window.roll(now, &self.config);
                window.errors >= self.config.max_errors
            }
            None => false,
        }
    }

    /// Snapshot of every window as of now; expired windows report zero errors.
    pub fn snapshot(&self) -> BTreeMap<String, RateLimitSnapshot> {
        let now = self.clock.now();
        self.lock()
            .iter()
            .map(|(key, window)| {
                let expired = elapsed_between(window.window_start, now) >= self.config.window;
                let errors = if expired { 0 } else { window.errors };
                let snapshot = RateLimitSnapshot {
                    errors,
                    window_start: if expired { now } else { window.window_start },
                    is_limited: errors >= self.config.max_errors,
                };
                (key.clone(), snapshot)
            })
            .collect()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ErrorWindow>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

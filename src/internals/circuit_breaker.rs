//! Per-operation circuit breakers.
//!
//! Each operation key gets its own breaker, created lazily on the first
//! recorded outcome:
//! - Closed: failures accumulate; reaching `failure_threshold` opens the circuit
//! - Open: checks fail fast until `recovery_timeout` has passed since the last failure
//! - HalfOpen: one trial at a time; `success_threshold` successes close the
//!   circuit, any failure reopens it
//!
//! The Open to HalfOpen transition happens while evaluating
//! [`CircuitBreakerRegistry::is_open`], never on a timer. A half-open check
//! that passes claims the trial, and other callers see the circuit as open
//! until that trial records its outcome. Every state change is a single locked
//! read-modify-write.

use crate::clock::{elapsed_between, Clock};
use crate::config::CircuitBreakerConfig;
use crate::core_types::ErrorValue;
use crate::logging::{log_debug, log_info, log_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking requests
    HalfOpen, // Testing if service recovered
}

/// Read-only view of one breaker, for dashboards and health checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            trial_in_flight: false,
        }
    }

    /// True while requests must be rejected; moves an expired Open circuit to
    /// HalfOpen and claims the single half-open trial.
    fn reject(&mut self, key: &str, now: DateTime<Utc>, config: &CircuitBreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed => return false,
            CircuitState::HalfOpen if self.trial_in_flight => {
                log_debug!(
                    circuit_breaker = "trial_in_flight",
                    operation = key,
                    "Half-open trial already running, rejecting"
                );
                return true;
            }
            CircuitState::HalfOpen => {
                self.trial_in_flight = true;
                return false;
            }
            CircuitState::Open => {}
        }

        let expired = self
            .last_failure_time
            .map_or(true, |last| elapsed_between(last, now) >= config.recovery_timeout);
        if expired {
            log_debug!(
                circuit_breaker = "transitioning_to_half_open",
                operation = key,
                recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
                "Circuit breaker attempting recovery"
            );
            self.state = CircuitState::HalfOpen;
            self.success_count = 0;
            self.trial_in_flight = true;
            false
        } else {
            true
        }
    }

    fn record_success(&mut self, key: &str, config: &CircuitBreakerConfig) {
        self.trial_in_flight = false;
        match self.state {
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    log_info!(
                        circuit_breaker = "recovered",
                        operation = key,
                        successes = self.success_count,
                        "Circuit breaker recovered, returning to closed state"
                    );
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                    self.last_failure_time = None;
                }
            }
            CircuitState::Open => {
                log_debug!(
                    circuit_breaker = "success_while_open",
                    operation = key,
                    "Ignoring success recorded while circuit is open"
                );
            }
        }
    }

    fn record_failure(&mut self, key: &str, now: DateTime<Utc>, config: &CircuitBreakerConfig) {
        self.failure_count += 1;
        self.last_failure_time = Some(now);
        self.trial_in_flight = false;

        match self.state {
            CircuitState::HalfOpen => {
                log_warn!(
                    circuit_breaker = "reopened",
                    operation = key,
                    "Circuit breaker trial failed, reopening"
                );
                self.state = CircuitState::Open;
                self.success_count = 0;
            }
            CircuitState::Closed if self.failure_count >= config.failure_threshold => {
                log_warn!(
                    circuit_breaker = "opened",
                    operation = key,
                    failure_count = self.failure_count,
                    failure_threshold = config.failure_threshold,
                    recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
                    "Circuit breaker opened due to repeated failures"
                );
                self.state = CircuitState::Open;
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            state: self.state,
            failures: self.failure_count,
            successes: self.success_count,
            last_failure_time: self.last_failure_time,
        }
    }
}

/// Registry of breakers keyed by operation.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether `error` counts toward the breaker at all.
    pub fn is_monitored(&self, error: &ErrorValue) -> bool {
        self.config.monitors(error.code())
    }

    /// True only while the circuit for `key` is open and its recovery timeout
    /// has not elapsed. An elapsed open circuit moves to half-open here.
    /// Unmonitored errors never see an open circuit.
    pub fn is_open(&self, key: &str, error: &ErrorValue) -> bool {
        if !self.is_monitored(error) {
            return false;
        }
        let now = self.clock.now();
        let mut breakers = self.lock();
        breakers
            .get_mut(key)
            .is_some_and(|breaker| breaker.reject(key, now, &self.config))
    }

    /// Record a failure; unmonitored codes only end a running half-open trial.
    pub fn record_failure(&self, key: &str, error: &ErrorValue) {
        if !self.is_monitored(error) {
            log_debug!(
                operation = key,
                code = %error.code(),
                "Failure not monitored by circuit breaker"
            );
            self.release_trial(key);
            return;
        }
        let now = self.clock.now();
        let mut breakers = self.lock();
        breakers
            .entry(key.to_string())
            .or_insert_with(CircuitBreaker::new)
            .record_failure(key, now, &self.config);
    }

    pub fn record_success(&self, key: &str) {
        let mut breakers = self.lock();
        breakers
            .entry(key.to_string())
            .or_insert_with(CircuitBreaker::new)
            .record_success(key, &self.config);
    }

    /// Give back a half-open trial claimed by [`is_open`](Self::is_open)
    /// without recording an outcome.
    pub fn release_trial(&self, key: &str) {
        if let Some(breaker) = self.lock().get_mut(key) {
            breaker.trial_in_flight = false;
        }
    }

    /// Current state for `key`, if a breaker exists.
    pub fn state(&self, key: &str) -> Option<CircuitBreakerSnapshot> {
        self.lock().get(key).map(CircuitBreaker::snapshot)
    }

    pub fn snapshot(&self) -> BTreeMap<String, CircuitBreakerSnapshot> {
        self.lock()
            .iter()
            .map(|(key, breaker)| (key.clone(), breaker.snapshot()))
            .collect()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CircuitBreaker>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

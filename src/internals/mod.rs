//! Resilience machinery behind the recovery orchestrator
//!
//! Per-operation state (circuit breakers and error budgets) plus the retry loop
//! that consults it. The public types are re-exported through `lib.rs`.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

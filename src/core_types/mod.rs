//! Core error types shared by every component.
//!
//! - [`taxonomy`]: codes, categories, severities and sources with their static tables
//! - [`value`]: the canonical [`ErrorValue`] and its [`ErrorContext`]
//! - [`raw`]: [`RawError`], a failure as it was raised

pub mod raw;
pub mod taxonomy;
pub mod value;

pub use raw::RawError;
pub use taxonomy::{ErrorCategory, ErrorCode, ErrorSeverity, ErrorSource};
pub use value::{ErrorContext, ErrorValue, RetryInfo, DEFAULT_OPERATION, MAX_STACK_LINES};

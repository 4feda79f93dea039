// Test modules for render-recovery crate
//
// Test organization follows the template pattern where each source file
// has a corresponding test file that focuses on business logic verification.

// Test helper utilities (fixed clock, canonical errors, scripted operations)
pub mod helpers;

pub mod core_types;

pub mod report;


// Facade and configuration
pub mod config;
pub mod handler;

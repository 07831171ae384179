//! Shared types and utilities for Vigil
//!
//! This crate contains the alert rule model, report tables and the small
//! calendar and parsing helpers used by the engine and the CLI.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{report::*, rule::*, trigger::*};

//! Core data types shared across Vigil components

pub mod report;
pub mod rule;
pub mod trigger;

//! Resilience helpers.
//!
//! # Design Decisions
//! - Polling loops are explicit loops over an attempt counter, never recursion
//! - Every wait between attempts is bounded by a configured cap

pub mod backoff;

pub use backoff::calculate_backoff;

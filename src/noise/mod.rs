//! Error/noise controller.
//!
//! # Data Flow
//! ```text
//! report(message)
//!     → classify.rs (category, severity, known-noise flag)
//!     → sliding-window throttle per message (Logged / Demoted / Suppressed)
//!     → ring buffer + counters
//!     → matching recovery actions, rate-limited per key
//! ```
//!
//! Nothing here feeds back into control flow of other components apart from
//! the registered recovery actions.

pub mod classify;
pub mod controller;

pub use classify::{classify, Classification, ErrorCategory, Severity};
pub use controller::{ErrorRecord, ErrorReporter, ErrorStats, NoiseController, RecoveryAction, RecoveryTrigger, ReportOutcome};

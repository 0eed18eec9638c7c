//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscribed task (provider watch, confirmation
//!     watches, config watcher, admin server) exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger() → WalletBridge::teardown()
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

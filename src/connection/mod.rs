//! Connection state machine.
//!
//! # Data Flow
//! ```text
//! discovery Found ──▶ auto_connect() ─┐
//! caller ──────────▶ request_connection() ─┤
//! provider events ─▶ handle_provider_event() ─┤
//!                                          ▼
//!                               ConnectionManager (state.rs record)
//!                                          │
//!                                          ▼
//!                 walletConnected / walletDisconnected / walletError /
//!                 balanceUpdated / balanceError on the event bus
//! ```

pub mod machine;
pub mod state;

pub use machine::{ConnectionError, ConnectionManager, ConnectionResult};
pub use state::{ConnectionState, ConnectionStatus};

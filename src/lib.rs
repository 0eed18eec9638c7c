//! Wallet connection coordination layer.
//!
//! Finds a wallet provider, guards the slot it lives in, tracks the wallet
//! session, brokers cross-origin messages and dispatches transactions. See
//! [`WalletBridge`] for the caller-facing surface.

// Core subsystems
pub mod broker;
pub mod connection;
pub mod discovery;
pub mod events;
pub mod guard;
pub mod origin;
pub mod provider;
pub mod transactions;

// Diagnostics
pub mod noise;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub mod scoring;

mod bridge;

pub use bridge::{BridgeStatus, WalletBridge};
pub use config::BridgeConfig;
pub use lifecycle::Shutdown;

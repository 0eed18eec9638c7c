//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → handed to each subsystem at construction
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → origin allow-list swapped atomically (arc-swap)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only the origin allow-list is hot-reloadable; other settings need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, BridgeConfig, BrokerConfig, ConnectionConfig, DiscoveryConfig, GuardConfig,
    NoiseConfig, ObservabilityConfig, OriginsConfig, SourceConfig, TransactionConfig,
};

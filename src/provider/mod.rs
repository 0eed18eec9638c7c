//! Wallet provider contract.
//!
//! # Data Flow
//! ```text
//! host session / injected wallet / JSON-RPC node
//!     → handle.rs (ProviderHandle: request, events, capabilities)
//!     → methods.rs (recognized wallet RPC methods)
//!     → guard (authoritative slot, proxy routing)
//! ```

pub mod handle;
pub mod methods;
pub mod rpc;

pub use handle::{Capabilities, ProviderError, ProviderEvent, ProviderHandle, ProviderResult};
pub use methods::WalletMethod;
pub use rpc::JsonRpcProvider;

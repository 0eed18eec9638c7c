//! The provider capability contract.
//!
//! A `ProviderHandle` is anything that can execute wallet RPC requests: a
//! host-injected session object, a directly injected wallet, or a JSON-RPC
//! endpoint. Everything above this layer talks to providers only through
//! this trait.

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// Events a provider may push to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The set of exposed accounts changed. Empty means the user disconnected.
    AccountsChanged(Vec<String>),
    /// The active chain changed (hex chain id).
    ChainChanged(String),
    /// The provider lost its connection to the wallet.
    Disconnect,
}

/// Optional features a provider advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Supports batched calls (`wallet_sendCalls`).
    pub batch_calls: bool,
    /// Pushes `ProviderEvent`s through `events()`.
    pub events: bool,
}

/// Errors reported by a provider.
///
/// Codes follow EIP-1193 where the provider reports one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The user explicitly rejected the request (4001).
    #[error("user rejected the request")]
    UserRejected,

    /// The requested method is not recognized or not supported (4200, -32601).
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// No authoritative provider is available.
    #[error("no wallet provider available")]
    Unavailable,

    /// The account or method has not been authorized (4100).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The provider is disconnected from all chains (4900, 4901).
    #[error("provider disconnected")]
    Disconnected,

    /// The provider did not answer in time.
    #[error("provider timed out after {0} ms")]
    Timeout(u64),

    /// Any other JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The provider answered with something we cannot interpret.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Map an EIP-1193 / JSON-RPC error code to a typed error.
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            4001 => ProviderError::UserRejected,
            4100 => ProviderError::Unauthorized(message),
            4200 | -32601 => ProviderError::UnsupportedMethod(message),
            4900 | 4901 => ProviderError::Disconnected,
            _ => ProviderError::Rpc { code, message },
        }
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Opaque capability for executing wallet requests.
pub trait ProviderHandle: Send + Sync {
    /// Human-readable label used in logs.
    fn label(&self) -> &str;

    /// Execute a JSON-RPC style request.
    fn request(&self, method: &str, params: Value) -> BoxFuture<'_, ProviderResult<Value>>;

    /// Subscribe to pushed provider events, if the provider emits any.
    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }

    /// Optional features this provider supports.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Whether the provider has finished its own initialization.
    ///
    /// Discovery skips candidates that are present but not yet ready.
    fn is_ready(&self) -> bool {
        true
    }
}

//! Provider handle backed by a JSON-RPC endpoint.
//!
//! # Responsibilities
//! - Forward wallet requests to a node (e.g. Anvil with unlocked accounts)
//! - Enforce a per-endpoint timeout
//! - Fail over to the next endpoint on transport errors
//!
//! An error *response* from a node is authoritative and is not retried on
//! the failover endpoints; only transport failures and timeouts are.

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::schema::SourceConfig;
use crate::provider::handle::{ProviderError, ProviderHandle, ProviderResult};

/// JSON-RPC provider with ordered failover.
#[derive(Clone)]
pub struct JsonRpcProvider {
    label: String,
    /// Primary endpoint first, then failovers.
    endpoints: Vec<DynProvider>,
    timeout_duration: Duration,
}

impl JsonRpcProvider {
    /// Build a provider from a source definition.
    ///
    /// Invalid failover URLs are skipped; an invalid primary URL is an error.
    pub fn new(config: &SourceConfig) -> ProviderResult<Self> {
        let primary: url::Url = config.rpc_url.parse().map_err(|e| {
            ProviderError::Malformed(format!("invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;

        let mut endpoints = vec![ProviderBuilder::new().connect_http(primary).erased()];
        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => endpoints.push(ProviderBuilder::new().connect_http(url).erased()),
                Err(_) => tracing::warn!(url = %url_str, source = %config.name, "Ignoring invalid failover RPC URL"),
            }
        }

        tracing::info!(
            source = %config.name,
            rpc_url = %config.rpc_url,
            failovers = endpoints.len() - 1,
            "JSON-RPC provider configured"
        );

        Ok(Self {
            label: config.name.clone(),
            endpoints,
            timeout_duration: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn dispatch(&self, method: String, params: Value) -> ProviderResult<Value> {
        let mut last_error = ProviderError::Unavailable;

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let fut = endpoint.raw_request::<Value, Value>(method.clone().into(), params.clone());
            match timeout(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    if let Some(payload) = e.as_error_resp() {
                        return Err(ProviderError::from_code(payload.code, payload.message.to_string()));
                    }
                    tracing::warn!(endpoint_idx = i, method = %method, error = %e, "RPC transport error, trying next endpoint");
                    last_error = ProviderError::Rpc {
                        code: -32603,
                        message: e.to_string(),
                    };
                }
                Err(_) => {
                    tracing::warn!(endpoint_idx = i, method = %method, "RPC timeout, trying next endpoint");
                    last_error = ProviderError::Timeout(self.timeout_duration.as_millis() as u64);
                }
            }
        }

        Err(last_error)
    }
}

impl ProviderHandle for JsonRpcProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn request(&self, method: &str, params: Value) -> BoxFuture<'_, ProviderResult<Value>> {
        let method = method.to_string();
        Box::pin(self.dispatch(method, params))
    }
}

impl std::fmt::Debug for JsonRpcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcProvider")
            .field("label", &self.label)
            .field("endpoints", &self.endpoints.len())
            .field("timeout_ms", &self.timeout_duration.as_millis())
            .finish()
    }
}

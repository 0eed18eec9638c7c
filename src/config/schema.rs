//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Origins trusted by default: the Farcaster host clients and their subdomains.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 5] = [
    "https://farcaster.xyz",
    "https://warpcast.com",
    "https://client.warpcast.com",
    "https://*.farcaster.xyz",
    "https://*.warpcast.com",
];

/// Root configuration for the wallet bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Provider discovery polling settings.
    pub discovery: DiscoveryConfig,

    /// Cross-origin message broker settings.
    pub broker: BrokerConfig,

    /// Trusted origins for inbound messages.
    pub origins: OriginsConfig,

    /// Global binding guard settings.
    pub guard: GuardConfig,

    /// Connection state machine settings.
    pub connection: ConnectionConfig,

    /// Transaction dispatch and confirmation settings.
    pub transactions: TransactionConfig,

    /// Error/noise controller settings.
    pub noise: NoiseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// JSON-RPC backed provider sources, in priority order.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Provider discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Maximum number of polling attempts before reporting not found.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay between attempts in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

/// Message broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Time to wait for a correlated response in milliseconds.
    pub request_timeout_ms: u64,

    /// Target origin used when `send` is called without one.
    pub default_target_origin: String,

    /// Origin of the parent context, used for broadcasts to the parent.
    pub parent_origin: Option<String>,

    /// Number of settled request IDs remembered to ignore duplicate responses.
    pub settled_history: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            default_target_origin: "*".to_string(),
            parent_origin: None,
            settled_history: 256,
        }
    }
}

/// Trusted origin allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginsConfig {
    /// Exact origins (`https://host`) or subdomain patterns (`https://*.host`).
    pub allowed: Vec<String>,
}

impl Default for OriginsConfig {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Global binding guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Name of the guarded slot.
    pub slot_name: String,

    /// Redefinition attempts per window before a warning is emitted.
    pub redefinition_warn_threshold: u32,

    /// Redefinition counting window in milliseconds.
    pub redefinition_window_ms: u64,

    /// Extra competing-injection signatures, on top of the built-in ones.
    pub script_signatures: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            slot_name: "ethereum".to_string(),
            redefinition_warn_threshold: 10,
            redefinition_window_ms: 5000,
            script_signatures: Vec::new(),
        }
    }
}

/// Connection state machine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Timeout for the post-connect balance fetch in milliseconds.
    pub balance_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            balance_timeout_ms: 5000,
        }
    }
}

/// Transaction dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Receipt polling interval in milliseconds.
    pub confirmation_poll_ms: u64,

    /// Give up watching for confirmation after this many seconds.
    pub confirmation_timeout_secs: u64,

    /// How long a finalized status stays queryable, in milliseconds.
    pub tracked_retention_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            confirmation_poll_ms: 2000,
            confirmation_timeout_secs: 120,
            tracked_retention_ms: 300_000,
        }
    }
}

/// Error/noise controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Occurrences within the window after which a message is suppressed.
    pub throttle_threshold: u32,

    /// Sliding throttle window in milliseconds.
    pub throttle_window_ms: u64,

    /// Capacity of the diagnostic ring buffer.
    pub ring_capacity: usize,

    /// Minimum delay between recovery attempts per key, in milliseconds.
    pub recovery_delay_ms: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            throttle_threshold: 3,
            throttle_window_ms: 5000,
            ring_capacity: 50,
            recovery_delay_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin diagnostics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin diagnostics endpoint.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// A JSON-RPC endpoint acting as a wallet provider source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Source identifier for logging and priority reporting.
    pub name: String,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_source_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.discovery.max_delay_ms, 5000);
        assert_eq!(config.broker.request_timeout_ms, 10_000);
        assert_eq!(config.noise.throttle_threshold, 3);
        assert_eq!(config.origins.allowed.len(), DEFAULT_ALLOWED_ORIGINS.len());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config: BridgeConfig = toml::from_str(
            r#"
            [discovery]
            max_attempts = 3

            [[sources]]
            name = "anvil"
            rpc_url = "http://127.0.0.1:8545"
            "#,
        )
        .unwrap();
        assert_eq!(config.discovery.max_attempts, 3);
        assert_eq!(config.discovery.base_delay_ms, 100);
        assert_eq!(config.sources[0].timeout_ms, 10_000);
    }
}

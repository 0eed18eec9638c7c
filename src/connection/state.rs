//! Connection state record.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

/// Snapshot of the wallet session.
///
/// `address` is set if and only if `status` is `Connected`; `Connected`
/// additionally requires `chain_id`. Only the connection manager builds
/// these, through the constructors below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub address: Option<String>,
    pub chain_id: Option<String>,
    pub balance: Option<String>,
    pub connection_method: Option<String>,
    /// Milliseconds since epoch.
    pub last_updated: u64,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            address: None,
            chain_id: None,
            balance: None,
            connection_method: None,
            last_updated: now_millis(),
        }
    }

    pub(crate) fn connecting(method: &str) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            connection_method: Some(method.to_string()),
            ..Self::disconnected()
        }
    }

    pub(crate) fn connected(address: String, chain_id: String, method: Option<String>) -> Self {
        Self {
            status: ConnectionStatus::Connected,
            address: Some(address),
            chain_id: Some(chain_id),
            balance: None,
            connection_method: method,
            last_updated: now_millis(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Whether the record satisfies the status/address invariant.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            ConnectionStatus::Connected => self.address.is_some() && self.chain_id.is_some(),
            _ => self.address.is_none() && self.balance.is_none(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = now_millis();
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::disconnected()
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

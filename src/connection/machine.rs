//! Connection state machine.
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting: request_connection(), or a discovered provider
//!                            that already exposes an authorized account
//! Connecting → Connected:    address and chain id both known
//! Connecting → Disconnected: request failed, or superseded by a disconnect
//! Connected → Disconnected:  disconnect(), accountsChanged([]), provider disconnect
//! ```
//!
//! Every await happens outside the state lock. Each connect attempt records
//! the generation it started in; any disconnect bumps the generation, so an
//! attempt that resolves after a disconnect is discarded instead of
//! resurrecting the session.

use alloy::primitives::{utils::format_ether, Address, U256};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use crate::config::ConnectionConfig;
use crate::connection::state::{ConnectionState, ConnectionStatus};
use crate::events::{DisconnectReason, WalletEvent, WalletEventBus};
use crate::guard::ProviderProxy;
use crate::observability::metrics;
use crate::provider::{ProviderError, ProviderEvent, WalletMethod};

/// Errors returned to callers of `request_connection`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("no wallet provider is available")]
    NoProvider,

    #[error("the connection request was rejected in the wallet")]
    UserRejected,

    #[error("the wallet did not return any accounts")]
    NoAccounts,

    #[error("a connection attempt is already in progress")]
    InProgress,

    /// A disconnect arrived before the attempt completed.
    #[error("the connection attempt was superseded")]
    Superseded,

    #[error("wallet error: {0}")]
    Provider(ProviderError),
}

impl From<ProviderError> for ConnectionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserRejected => ConnectionError::UserRejected,
            ProviderError::Unavailable => ConnectionError::NoProvider,
            other => ConnectionError::Provider(other),
        }
    }
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Single source of truth for the wallet session.
pub struct ConnectionManager {
    proxy: Arc<ProviderProxy>,
    bus: Arc<WalletEventBus>,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(proxy: Arc<ProviderProxy>, bus: Arc<WalletEventBus>, config: ConnectionConfig) -> Self {
        Self {
            proxy,
            bus,
            config,
            state: Mutex::new(ConnectionState::disconnected()),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        // State is replaced wholesale under the lock, so a poisoned value is still coherent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> ConnectionState {
        self.lock().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    /// Connect silently if a freshly discovered provider already exposes an
    /// authorized account. Returns whether a session was established.
    ///
    /// Does nothing unless currently `Disconnected`, so repeated discovery
    /// never restarts an active or in-flight session.
    pub async fn auto_connect(self: &Arc<Self>, source: &str) -> ConnectionResult<bool> {
        if self.status() != ConnectionStatus::Disconnected {
            return Ok(false);
        }
        let observed = self.generation.load(Ordering::SeqCst);

        let accounts = match self.proxy.call(WalletMethod::Accounts, json!([])).await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::debug!(source = source, error = %e, "Pre-authorized account lookup failed");
                return Ok(false);
            }
        };
        if accounts.as_array().map_or(true, |a| a.is_empty()) {
            tracing::debug!(source = source, "Provider has no pre-authorized account, waiting for explicit connect");
            return Ok(false);
        }

        let method = format!("auto:{}", source);
        let generation = {
            let mut state = self.lock();
            if state.status != ConnectionStatus::Disconnected
                || self.generation.load(Ordering::SeqCst) != observed
            {
                return Ok(false);
            }
            *state = ConnectionState::connecting(&method);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        metrics::record_connection_status(ConnectionStatus::Connecting.as_str());

        match self.finish(generation, accounts, method).await {
            Ok(_) => Ok(true),
            Err(ConnectionError::Superseded) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Ask the wallet to authorize an account.
    pub async fn request_connection(self: &Arc<Self>) -> ConnectionResult<ConnectionState> {
        if !self.proxy.has_provider() {
            let err = ConnectionError::NoProvider;
            self.bus.publish(WalletEvent::WalletError {
                message: err.to_string(),
            });
            return Err(err);
        }

        let generation = {
            let mut state = self.lock();
            match state.status {
                ConnectionStatus::Connected => return Ok(state.clone()),
                ConnectionStatus::Connecting => return Err(ConnectionError::InProgress),
                ConnectionStatus::Disconnected => {}
            }
            *state = ConnectionState::connecting("request");
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        metrics::record_connection_status(ConnectionStatus::Connecting.as_str());

        let accounts = match self.proxy.call(WalletMethod::RequestAccounts, json!([])).await {
            Ok(accounts) => accounts,
            Err(e) => return Err(self.fail(generation, e.into())),
        };
        self.finish(generation, accounts, "request".to_string()).await
    }

    async fn finish(self: &Arc<Self>, generation: u64, accounts: Value, method: String) -> ConnectionResult<ConnectionState> {
        let address = match first_account(&accounts) {
            Ok(address) => address,
            Err(e) => return Err(self.fail(generation, e)),
        };
        let chain_id = match self.proxy.call(WalletMethod::ChainId, json!([])).await {
            Ok(value) => match parse_chain_id(&value) {
                Some(chain_id) => chain_id,
                None => {
                    let err = ProviderError::Malformed(format!("chain id {}", value));
                    return Err(self.fail(generation, err.into()));
                }
            },
            Err(e) => return Err(self.fail(generation, e.into())),
        };

        let snapshot = {
            let mut state = self.lock();
            if self.generation.load(Ordering::SeqCst) != generation
                || state.status != ConnectionStatus::Connecting
            {
                tracing::debug!(generation = generation, "Connect attempt superseded before completion");
                return Err(ConnectionError::Superseded);
            }
            *state = ConnectionState::connected(address.clone(), chain_id.clone(), Some(method.clone()));
            state.clone()
        };

        metrics::record_connection_status(ConnectionStatus::Connected.as_str());
        tracing::info!(address = %address, chain_id = %chain_id, method = %method, "Wallet connected");
        self.bus.publish(WalletEvent::WalletConnected {
            address,
            chain_id,
            connection_method: method,
        });
        self.refresh_balance();
        Ok(snapshot)
    }

    /// Abandon attempt `generation` if it is still the live one.
    fn fail(&self, generation: u64, err: ConnectionError) -> ConnectionError {
        let reverted = {
            let mut state = self.lock();
            if self.generation.load(Ordering::SeqCst) == generation && state.status == ConnectionStatus::Connecting {
                *state = ConnectionState::disconnected();
                true
            } else {
                false
            }
        };
        if reverted {
            metrics::record_connection_status(ConnectionStatus::Disconnected.as_str());
            tracing::warn!(error = %err, "Wallet connection failed");
            self.bus.publish(WalletEvent::WalletError {
                message: err.to_string(),
            });
        }
        err
    }

    /// End the session (or abort an in-flight attempt). Returns false if
    /// already disconnected.
    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        let previous = {
            let mut state = self.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            let previous = state.status;
            if previous != ConnectionStatus::Disconnected {
                *state = ConnectionState::disconnected();
            }
            previous
        };
        if previous == ConnectionStatus::Disconnected {
            return false;
        }

        metrics::record_connection_status(ConnectionStatus::Disconnected.as_str());
        tracing::info!(reason = ?reason, from = previous.as_str(), "Wallet disconnected");
        self.bus.publish(WalletEvent::WalletDisconnected { reason });
        true
    }

    /// Apply an event pushed by the authoritative provider.
    pub fn handle_provider_event(self: &Arc<Self>, event: &ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                self.disconnect(DisconnectReason::AccountsRevoked);
            }
            ProviderEvent::AccountsChanged(accounts) => {
                let Ok(address) = first_account(&json!(accounts)) else {
                    tracing::debug!(accounts = ?accounts, "Ignoring malformed accountsChanged payload");
                    return;
                };
                let changed = {
                    let mut state = self.lock();
                    if state.status != ConnectionStatus::Connected || state.address.as_deref() == Some(address.as_str()) {
                        false
                    } else {
                        self.generation.fetch_add(1, Ordering::SeqCst);
                        state.address = Some(address.clone());
                        state.balance = None;
                        state.touch();
                        true
                    }
                };
                if changed {
                    tracing::info!(address = %address, "Active account changed");
                    self.bus.publish(WalletEvent::AccountChanged { address });
                    self.refresh_balance();
                }
            }
            ProviderEvent::ChainChanged(raw) => {
                let Some(chain_id) = parse_chain_id(&json!(raw)) else {
                    return;
                };
                let changed = {
                    let mut state = self.lock();
                    if state.status != ConnectionStatus::Connected || state.chain_id.as_deref() == Some(chain_id.as_str()) {
                        false
                    } else {
                        self.generation.fetch_add(1, Ordering::SeqCst);
                        state.chain_id = Some(chain_id.clone());
                        state.balance = None;
                        state.touch();
                        true
                    }
                };
                if changed {
                    tracing::info!(chain_id = %chain_id, "Chain changed");
                    self.bus.publish(WalletEvent::ChainChanged { chain_id });
                    self.refresh_balance();
                }
            }
            ProviderEvent::Disconnect => {
                self.disconnect(DisconnectReason::ProviderDisconnected);
            }
        }
    }

    /// Fetch the balance in the background. Never changes the status; a
    /// failure is reported as `balanceError` and leaves the balance unset.
    pub fn refresh_balance(self: &Arc<Self>) {
        let (address, generation) = {
            let state = self.lock();
            match (&state.status, &state.address) {
                (ConnectionStatus::Connected, Some(address)) => {
                    (address.clone(), self.generation.load(Ordering::SeqCst))
                }
                _ => return,
            }
        };

        let manager = Arc::clone(self);
        let timeout = Duration::from_millis(self.config.balance_timeout_ms);
        tokio::spawn(async move {
            let request = manager.proxy.call(WalletMethod::GetBalance, json!([address, "latest"]));
            let result = match tokio::time::timeout(timeout, request).await {
                Ok(Ok(value)) => parse_balance(&value)
                    .ok_or_else(|| ProviderError::Malformed(format!("balance {}", value))),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProviderError::Timeout(timeout.as_millis() as u64)),
            };

            match result {
                Ok(balance) => {
                    let applied = {
                        let mut state = manager.lock();
                        if manager.generation.load(Ordering::SeqCst) == generation
                            && state.address.as_deref() == Some(address.as_str())
                        {
                            state.balance = Some(balance.clone());
                            state.touch();
                            true
                        } else {
                            false
                        }
                    };
                    if applied {
                        tracing::debug!(address = %address, balance = %balance, "Balance updated");
                        manager.bus.publish(WalletEvent::BalanceUpdated { address, balance });
                    }
                }
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Balance fetch failed");
                    manager.bus.publish(WalletEvent::BalanceError {
                        address,
                        message: e.to_string(),
                    });
                }
            }
        });
    }
}

/// First account of an `eth_accounts`-style array, checksummed.
fn first_account(accounts: &Value) -> Result<String, ConnectionError> {
    let first = accounts
        .as_array()
        .and_then(|a| a.first())
        .ok_or(ConnectionError::NoAccounts)?;
    let raw = first
        .as_str()
        .ok_or_else(|| ProviderError::Malformed(format!("account {}", first)))?;
    let address = Address::from_str(raw).map_err(|e| ProviderError::Malformed(format!("account '{}': {}", raw, e)))?;
    Ok(address.to_checksum(None))
}

/// Normalize a chain id to lowercase `0x` hex. Accepts hex strings,
/// decimal strings and JSON numbers.
fn parse_chain_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok()?,
            None => s.parse::<u64>().ok()?,
        },
        Value::Number(n) => n.as_u64()?,
        _ => return None,
    };
    Some(format!("{:#x}", id))
}

/// Wei quantity to a decimal ether string.
fn parse_balance(value: &Value) -> Option<String> {
    let raw = value.as_str()?;
    let wei = U256::from_str(raw).ok()?;
    Some(format_ether(wei))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn test_first_account() {
        let address = first_account(&json!([ADDR])).unwrap();
        assert_eq!(address, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(first_account(&json!([])), Err(ConnectionError::NoAccounts));
        assert!(matches!(
            first_account(&json!(["nope"])),
            Err(ConnectionError::Provider(ProviderError::Malformed(_)))
        ));
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id(&json!("0x2105")), Some("0x2105".to_string()));
        assert_eq!(parse_chain_id(&json!("0X1")), Some("0x1".to_string()));
        assert_eq!(parse_chain_id(&json!("8453")), Some("0x2105".to_string()));
        assert_eq!(parse_chain_id(&json!(10)), Some("0xa".to_string()));
        assert_eq!(parse_chain_id(&json!(null)), None);
        assert_eq!(parse_chain_id(&json!("base")), None);
    }

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance(&json!("0xde0b6b3a7640000")).as_deref(), Some("1.000000000000000000"));
        assert_eq!(parse_balance(&json!(12)), None);
    }

    #[test]
    fn test_user_rejection_maps_to_typed_error() {
        assert_eq!(ConnectionError::from(ProviderError::UserRejected), ConnectionError::UserRejected);
        assert_eq!(ConnectionError::from(ProviderError::Unavailable), ConnectionError::NoProvider);
    }
}

//! Events published to UI and business logic.

use serde::Serialize;

use crate::transactions::types::TxStatus;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectReason {
    /// The caller asked to disconnect.
    Requested,
    /// The provider reported zero accounts.
    AccountsRevoked,
    /// The provider emitted `disconnect`.
    ProviderDisconnected,
    /// The bridge is being torn down.
    Teardown,
}

/// Typed events emitted by the connection layer and the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WalletEvent {
    ProviderDetected {
        source: String,
    },
    /// Discovery exhausted its attempts; the app runs standalone.
    ProviderNotFound {
        attempts: u32,
    },
    WalletConnected {
        address: String,
        chain_id: String,
        connection_method: String,
    },
    WalletDisconnected {
        reason: DisconnectReason,
    },
    AccountChanged {
        address: String,
    },
    ChainChanged {
        chain_id: String,
    },
    WalletError {
        message: String,
    },
    BalanceUpdated {
        address: String,
        balance: String,
    },
    BalanceError {
        address: String,
        message: String,
    },
    /// `hash` is the bundle id for batches sent as one `wallet_sendCalls`.
    TransactionSent {
        hash: String,
    },
    TransactionConfirmed {
        hash: String,
        status: TxStatus,
    },
}

impl WalletEvent {
    /// Topic name subscribers use with `on`.
    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::ProviderDetected { .. } => "providerDetected",
            WalletEvent::ProviderNotFound { .. } => "providerNotFound",
            WalletEvent::WalletConnected { .. } => "walletConnected",
            WalletEvent::WalletDisconnected { .. } => "walletDisconnected",
            WalletEvent::AccountChanged { .. } => "accountChanged",
            WalletEvent::ChainChanged { .. } => "chainChanged",
            WalletEvent::WalletError { .. } => "walletError",
            WalletEvent::BalanceUpdated { .. } => "balanceUpdated",
            WalletEvent::BalanceError { .. } => "balanceError",
            WalletEvent::TransactionSent { .. } => "transactionSent",
            WalletEvent::TransactionConfirmed { .. } => "transactionConfirmed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag_matches_topic() {
        let event = WalletEvent::WalletConnected {
            address: "0xabc".to_string(),
            chain_id: "0x1".to_string(),
            connection_method: "host".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
        assert_eq!(json["chainId"], "0x1");

        let event = WalletEvent::TransactionConfirmed {
            hash: "0x01".to_string(),
            status: TxStatus::Reverted,
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "transactionConfirmed");
    }
}

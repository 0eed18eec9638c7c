//! Wallet RPC methods recognized by the binding guard.

use std::fmt;

/// Method families routed to the authoritative provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletMethod {
    /// Already-authorized accounts, never prompts.
    Accounts,
    /// Ask the user to authorize accounts.
    RequestAccounts,
    ChainId,
    SendTransaction,
    /// `personal_sign`: `[data, address]`.
    Sign,
    /// Legacy `eth_sign`: `[address, data]`. Forwarded as-is.
    EthSign,
    SignTypedData,
    GetBalance,
    GetTransactionReceipt,
    /// Batched calls (EIP-5792).
    SendCalls,
    GetCallsStatus,
}

impl WalletMethod {
    pub const ALL: [WalletMethod; 11] = [
        WalletMethod::Accounts,
        WalletMethod::RequestAccounts,
        WalletMethod::ChainId,
        WalletMethod::SendTransaction,
        WalletMethod::Sign,
        WalletMethod::EthSign,
        WalletMethod::SignTypedData,
        WalletMethod::GetBalance,
        WalletMethod::GetTransactionReceipt,
        WalletMethod::SendCalls,
        WalletMethod::GetCallsStatus,
    ];

    /// The JSON-RPC method name sent to providers.
    pub fn rpc_name(self) -> &'static str {
        match self {
            WalletMethod::Accounts => "eth_accounts",
            WalletMethod::RequestAccounts => "eth_requestAccounts",
            WalletMethod::ChainId => "eth_chainId",
            WalletMethod::SendTransaction => "eth_sendTransaction",
            WalletMethod::Sign => "personal_sign",
            WalletMethod::EthSign => "eth_sign",
            WalletMethod::SignTypedData => "eth_signTypedData_v4",
            WalletMethod::GetBalance => "eth_getBalance",
            WalletMethod::GetTransactionReceipt => "eth_getTransactionReceipt",
            WalletMethod::SendCalls => "wallet_sendCalls",
            WalletMethod::GetCallsStatus => "wallet_getCallsStatus",
        }
    }

    /// Resolve a JSON-RPC method name.
    pub fn from_rpc_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.rpc_name() == name)
    }
}

impl fmt::Display for WalletMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rpc_name())
    }
}

//! Transaction request/result types and error definitions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::provider::ProviderError;

/// A transaction as submitted by the caller. Never mutated after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Wei amount as a `0x` quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl TransactionRequest {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            data: None,
            value: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// The call object shared by `eth_sendTransaction` and `wallet_sendCalls`.
    pub(crate) fn to_call_object(&self) -> Value {
        let mut call = Map::new();
        call.insert("to".into(), json!(self.to));
        if let Some(data) = &self.data {
            call.insert("data".into(), json!(data));
        }
        if let Some(value) = &self.value {
            call.insert("value".into(), json!(value));
        }
        Value::Object(call)
    }

    /// `eth_sendTransaction` params sent from `from`.
    pub(crate) fn to_rpc_params(&self, from: &str) -> Value {
        let mut call = self.to_call_object();
        if let Value::Object(map) = &mut call {
            map.insert("from".into(), json!(from));
        }
        json!([call])
    }
}

/// Lifecycle of a submitted transaction. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Reverted,
}

impl TxStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    /// Move to `next` if that is a forward transition. Returns whether the
    /// status changed.
    pub fn advance(&mut self, next: TxStatus) -> bool {
        if *self == TxStatus::Pending && next.is_final() {
            *self = next;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionResult {
    pub hash: String,
    pub status: TxStatus,
}

/// Transaction failures, worded for display to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Connect a wallet before sending a transaction")]
    NotConnected,

    #[error("The transaction was rejected in the wallet")]
    UserRejected,

    /// No wallet, or a wallet that cannot send this kind of request.
    #[error("The wallet cannot send this transaction right now")]
    ProviderUnavailable,

    #[error("The transaction could not be sent: {0}")]
    Failed(String),
}

impl From<ProviderError> for TransactionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserRejected => TransactionError::UserRejected,
            ProviderError::Unavailable
            | ProviderError::Disconnected
            | ProviderError::Timeout(_)
            | ProviderError::UnsupportedMethod(_) => TransactionError::ProviderUnavailable,
            ProviderError::Unauthorized(_) => TransactionError::NotConnected,
            ProviderError::Rpc { message, .. } => TransactionError::Failed(message),
            ProviderError::Malformed(detail) => TransactionError::Failed(detail),
        }
    }
}

pub type TransactionOutcome = Result<TransactionResult, TransactionError>;

/// Result of `send_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResult {
    /// The wallet accepted every call as one bundle.
    Bundled { id: String, calls: usize },
    /// Calls were sent one by one, in order, with one outcome per call.
    Sequential(Vec<TransactionOutcome>),
}

impl BatchResult {
    pub fn len(&self) -> usize {
        match self {
            BatchResult::Bundled { calls, .. } => *calls,
            BatchResult::Sequential(outcomes) => outcomes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls that were accepted by the wallet.
    pub fn succeeded(&self) -> usize {
        match self {
            BatchResult::Bundled { calls, .. } => *calls,
            BatchResult::Sequential(outcomes) => outcomes.iter().filter(|o| o.is_ok()).count(),
        }
    }
}

pub type DispatchResult<T> = Result<T, TransactionError>;

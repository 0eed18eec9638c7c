//! Transaction dispatcher.
//!
//! # Data Flow
//! ```text
//! send_transaction(tx)
//!     → requires Connected (ConnectionManager snapshot)
//!     → proxy eth_sendTransaction → hash
//!     → { hash, pending } returned, transactionSent published
//!     → detached receipt poll → transactionConfirmed { confirmed | reverted }
//!
//! send_batch(calls)
//!     → wallet_sendCalls when the provider advertises batch support
//!     → otherwise send_transaction per call, in order, one outcome each
//! ```

pub mod dispatcher;
pub mod types;

pub use dispatcher::TransactionDispatcher;
pub use types::{
    BatchResult, DispatchResult, TransactionError, TransactionOutcome, TransactionRequest, TransactionResult,
    TxStatus,
};

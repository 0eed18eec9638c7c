//! Transaction dispatch and confirmation tracking.
//!
//! # Responsibilities
//! - Route single and batched transactions through the authoritative provider
//! - Return `pending` as soon as the wallet accepts a transaction
//! - Watch for the receipt (or bundle status) in a detached task and publish
//!   the final status
//! - Forget finalized entries after the retention period, abandoned ones at once

use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

use crate::config::TransactionConfig;
use crate::connection::ConnectionManager;
use crate::events::{WalletEvent, WalletEventBus};
use crate::guard::ProviderProxy;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::provider::{ProviderError, ProviderHandle, WalletMethod};
use crate::transactions::types::{
    BatchResult, DispatchResult, TransactionError, TransactionRequest, TransactionResult, TxStatus,
};

/// What a confirmation task polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submission {
    /// `eth_getTransactionReceipt` by hash.
    Transaction,
    /// `wallet_getCallsStatus` by bundle id.
    Bundle,
}

/// Sends transactions on behalf of the connected account.
pub struct TransactionDispatcher {
    proxy: Arc<ProviderProxy>,
    connection: Arc<ConnectionManager>,
    bus: Arc<WalletEventBus>,
    config: TransactionConfig,
    tracked: Arc<DashMap<String, watch::Sender<TxStatus>>>,
    shutdown: Shutdown,
}

impl TransactionDispatcher {
    pub fn new(
        proxy: Arc<ProviderProxy>,
        connection: Arc<ConnectionManager>,
        bus: Arc<WalletEventBus>,
        config: TransactionConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            proxy,
            connection,
            bus,
            config,
            tracked: Arc::new(DashMap::new()),
            shutdown,
        }
    }

    /// Connected account and chain, or `NotConnected`.
    fn sender(&self) -> DispatchResult<(String, String)> {
        let state = self.connection.snapshot();
        match (state.is_connected(), state.address, state.chain_id) {
            (true, Some(address), Some(chain_id)) => Ok((address, chain_id)),
            _ => Err(TransactionError::NotConnected),
        }
    }

    /// Submit one transaction. Resolves with `pending` once the wallet
    /// returns a hash; confirmation arrives later as `transactionConfirmed`.
    ///
    /// Identical requests are never deduplicated.
    pub async fn send_transaction(&self, tx: &TransactionRequest) -> DispatchResult<TransactionResult> {
        let (from, _) = self.sender()?;

        let response = self
            .proxy
            .call(WalletMethod::SendTransaction, tx.to_rpc_params(&from))
            .await
            .map_err(|e| self.rejected(&tx.to, e))?;

        let hash = match response.as_str() {
            Some(hash) => hash.to_string(),
            None => {
                let err = ProviderError::Malformed(format!("transaction hash {}", response));
                return Err(self.rejected(&tx.to, err));
            }
        };

        metrics::record_transaction("sent");
        tracing::info!(hash = %hash, to = %tx.to, "Transaction submitted");
        self.track(hash.clone(), Submission::Transaction);

        Ok(TransactionResult {
            hash,
            status: TxStatus::Pending,
        })
    }

    fn rejected(&self, to: &str, err: ProviderError) -> TransactionError {
        let err = TransactionError::from(err);
        let outcome = match err {
            TransactionError::UserRejected => "rejected",
            _ => "failed",
        };
        metrics::record_transaction(outcome);
        tracing::warn!(to = %to, error = %err, "Transaction not submitted");
        err
    }

    /// Submit several calls. Uses the wallet's batch capability when it has
    /// one, otherwise sends them one at a time in order. A failed call does
    /// not stop the calls after it.
    pub async fn send_batch(&self, calls: &[TransactionRequest]) -> DispatchResult<BatchResult> {
        let (from, chain_id) = self.sender()?;
        if calls.is_empty() {
            return Ok(BatchResult::Sequential(Vec::new()));
        }

        if self.proxy.capabilities().batch_calls {
            let params = json!([{
                "version": "1.0",
                "from": from,
                "chainId": chain_id,
                "atomicRequired": false,
                "calls": calls.iter().map(TransactionRequest::to_call_object).collect::<Vec<_>>(),
            }]);
            match self.proxy.call(WalletMethod::SendCalls, params).await {
                Ok(response) => {
                    let id = bundle_id(&response)
                        .ok_or_else(|| TransactionError::Failed(format!("unexpected batch response {}", response)))?;
                    metrics::record_transaction("bundled");
                    tracing::info!(bundle = %id, calls = calls.len(), "Batch submitted as bundle");
                    self.track(id.clone(), Submission::Bundle);
                    return Ok(BatchResult::Bundled { id, calls: calls.len() });
                }
                Err(ProviderError::UnsupportedMethod(_)) => {
                    tracing::debug!(calls = calls.len(), "Bundled calls unsupported, falling back to sequential");
                }
                Err(e) => return Err(self.rejected("batch", e)),
            }
        }

        let mut outcomes = Vec::with_capacity(calls.len());
        for (index, call) in calls.iter().enumerate() {
            let outcome = self.send_transaction(call).await;
            if let Err(e) = &outcome {
                tracing::debug!(index = index, error = %e, "Batch call failed, continuing");
            }
            outcomes.push(outcome);
        }
        Ok(BatchResult::Sequential(outcomes))
    }

    /// Number of submissions whose status is still queryable.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Last known status of a transaction or bundle submitted through this
    /// dispatcher. `None` once it has been forgotten.
    pub fn status(&self, hash: &str) -> Option<TxStatus> {
        self.tracked.get(hash).map(|sender| *sender.borrow())
    }

    /// Subscribe to status changes. Dropping the receiver abandons the wait
    /// without affecting the submitted transaction.
    pub fn watch(&self, hash: &str) -> Option<watch::Receiver<TxStatus>> {
        self.tracked.get(hash).map(|sender| sender.subscribe())
    }

    /// Start tracking a submission and announce it.
    fn track(&self, hash: String, kind: Submission) {
        let (sender, _) = watch::channel(TxStatus::Pending);
        self.tracked.insert(hash.clone(), sender);
        self.bus.publish(WalletEvent::TransactionSent { hash: hash.clone() });
        self.spawn_confirmation(hash, kind);
    }

    fn spawn_confirmation(&self, hash: String, kind: Submission) {
        let proxy = Arc::clone(&self.proxy);
        let bus = Arc::clone(&self.bus);
        let tracked = Arc::clone(&self.tracked);
        let poll = Duration::from_millis(self.config.confirmation_poll_ms.max(1));
        let deadline = Duration::from_secs(self.config.confirmation_timeout_secs);
        let retention = Duration::from_millis(self.config.tracked_retention_ms);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let wait = async {
                let mut ticker = interval(poll);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let lookup = match kind {
                        Submission::Transaction => proxy
                            .call(WalletMethod::GetTransactionReceipt, json!([hash]))
                            .await
                            .map(|receipt| match receipt {
                                Value::Null => None,
                                receipt => Some(receipt_status(&receipt)),
                            }),
                        Submission::Bundle => proxy
                            .call(WalletMethod::GetCallsStatus, json!([hash]))
                            .await
                            .map(|status| bundle_status(&status)),
                    };
                    match lookup {
                        Ok(Some(status)) => return status,
                        Ok(None) => tracing::trace!(hash = %hash, "Transaction pending"),
                        Err(e) => {
                            tracing::debug!(hash = %hash, error = %e, "Status lookup failed, retrying");
                        }
                    }
                }
            };

            let status = tokio::select! {
                result = timeout(deadline, wait) => match result {
                    Ok(status) => status,
                    Err(_) => {
                        tracing::warn!(hash = %hash, timeout_secs = deadline.as_secs(), "Stopped watching for confirmation");
                        tracked.remove(&hash);
                        return;
                    }
                },
                _ = shutdown.recv() => {
                    tracked.remove(&hash);
                    return;
                }
            };

            let advanced = tracked
                .get(&hash)
                .map(|sender| sender.send_if_modified(|current| current.advance(status)))
                .unwrap_or(false);
            if advanced {
                let outcome = if status == TxStatus::Confirmed { "confirmed" } else { "reverted" };
                metrics::record_transaction(outcome);
                tracing::info!(hash = %hash, status = outcome, "Transaction finalized");
                bus.publish(WalletEvent::TransactionConfirmed { hash: hash.clone(), status });
            }

            tokio::select! {
                _ = sleep(retention) => {}
                _ = shutdown.recv() => {}
            }
            tracked.remove(&hash);
            tracing::trace!(hash = %hash, "Stopped tracking transaction");
        });
    }
}

/// `status` of a receipt: `0x1` succeeded, `0x0` reverted. Receipts without
/// a status field predate it and only exist for included transactions.
fn receipt_status(receipt: &Value) -> TxStatus {
    match receipt.get("status") {
        Some(Value::String(s)) if s == "0x0" || s == "0" => TxStatus::Reverted,
        Some(Value::Number(n)) if n.as_u64() == Some(0) => TxStatus::Reverted,
        Some(Value::Bool(false)) => TxStatus::Reverted,
        _ => TxStatus::Confirmed,
    }
}

/// Final status of a `wallet_getCallsStatus` answer, `None` while pending.
///
/// Accepts the numeric codes (1xx pending, 200 confirmed, 4xx-6xx failed)
/// and the older `PENDING`/`CONFIRMED` strings. A confirmed bundle with any
/// reverted receipt counts as reverted.
fn bundle_status(response: &Value) -> Option<TxStatus> {
    let confirmed = match response.get("status") {
        Some(Value::Number(code)) => match code.as_u64() {
            Some(200) => true,
            Some(code) if code >= 400 => false,
            _ => return None,
        },
        Some(Value::String(s)) if s.eq_ignore_ascii_case("confirmed") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("failed") => false,
        _ => return None,
    };
    if !confirmed {
        return Some(TxStatus::Reverted);
    }
    let reverted = response
        .get("receipts")
        .and_then(Value::as_array)
        .is_some_and(|receipts| receipts.iter().any(|r| receipt_status(r) == TxStatus::Reverted));
    Some(if reverted { TxStatus::Reverted } else { TxStatus::Confirmed })
}

/// `wallet_sendCalls` returns either a bare id or `{ id, .. }`.
fn bundle_id(response: &Value) -> Option<String> {
    response
        .as_str()
        .or_else(|| response.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

//! Shared utilities for integration testing.

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use wallet_bridge::broker::{BrokerError, MessageTarget, PostedMessage};
use wallet_bridge::discovery::{Probe, ProviderSource};
use wallet_bridge::events::WalletEvent;
use wallet_bridge::provider::{Capabilities, ProviderError, ProviderEvent, ProviderHandle, ProviderResult};
use wallet_bridge::{BridgeConfig, WalletBridge};

pub const ALICE: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const BOB: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const HOST_ORIGIN: &str = "https://farcaster.xyz";

/// Scripted wallet provider.
pub struct MockProvider {
    label: String,
    accounts: Mutex<Vec<String>>,
    authorized: AtomicBool,
    reject_connect: AtomicBool,
    chain_id: Mutex<String>,
    balance: Mutex<Option<String>>,
    batch: AtomicBool,
    failing_to: Mutex<HashSet<String>>,
    receipts: Mutex<HashMap<String, Value>>,
    bundles: Mutex<HashMap<String, Value>>,
    missing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, u64>>,
    calls: Mutex<Vec<(String, Value)>>,
    tx_counter: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl MockProvider {
    pub fn new(label: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            label: label.to_string(),
            accounts: Mutex::new(vec![ALICE.to_string()]),
            authorized: AtomicBool::new(false),
            reject_connect: AtomicBool::new(false),
            chain_id: Mutex::new("0x2105".to_string()),
            balance: Mutex::new(Some("0xde0b6b3a7640000".to_string())),
            batch: AtomicBool::new(false),
            failing_to: Mutex::new(HashSet::new()),
            receipts: Mutex::new(HashMap::new()),
            bundles: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            tx_counter: AtomicU64::new(0),
            events,
        }
    }

    /// Accounts are exposed without a prompt.
    pub fn pre_authorized(self) -> Self {
        self.authorized.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_batch_support(self) -> Self {
        self.batch.store(true, Ordering::SeqCst);
        self
    }

    pub fn rejecting_connect(self) -> Self {
        self.reject_connect.store(true, Ordering::SeqCst);
        self
    }

    pub fn without_balance(self) -> Self {
        *self.balance.lock().unwrap() = None;
        self
    }

    /// The wallet answers `method` with 4200.
    pub fn without_method(self, method: &str) -> Self {
        self.missing.lock().unwrap().insert(method.to_string());
        self
    }

    /// `eth_sendTransaction` to `to` is rejected by the user.
    pub fn fail_transactions_to(&self, to: &str) {
        self.failing_to.lock().unwrap().insert(to.to_lowercase());
    }

    pub fn set_receipt(&self, hash: &str, status: &str) {
        self.receipts
            .lock()
            .unwrap()
            .insert(hash.to_string(), json!({"transactionHash": hash, "status": status}));
    }

    /// Answer for `wallet_getCallsStatus`; unknown bundles report 100 (pending).
    pub fn set_bundle_status(&self, id: &str, status: Value) {
        self.bundles.lock().unwrap().insert(id.to_string(), status);
    }

    pub fn delay(&self, method: &str, ms: u64) {
        self.delays.lock().unwrap().insert(method.to_string(), ms);
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p)
            .collect()
    }

    fn respond(&self, method: &str, params: &Value) -> ProviderResult<Value> {
        if self.missing.lock().unwrap().contains(method) {
            return Err(ProviderError::from_code(4200, format!("{} not supported", method)));
        }
        match method {
            "eth_accounts" => {
                if self.authorized.load(Ordering::SeqCst) {
                    Ok(json!(*self.accounts.lock().unwrap()))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_requestAccounts" => {
                if self.reject_connect.load(Ordering::SeqCst) {
                    return Err(ProviderError::from_code(4001, "User rejected the request."));
                }
                self.authorized.store(true, Ordering::SeqCst);
                Ok(json!(*self.accounts.lock().unwrap()))
            }
            "eth_chainId" => Ok(json!(*self.chain_id.lock().unwrap())),
            "eth_getBalance" => match self.balance.lock().unwrap().clone() {
                Some(balance) => Ok(json!(balance)),
                None => Err(ProviderError::from_code(-32000, "balance unavailable")),
            },
            "eth_sendTransaction" => {
                let to = params[0]["to"].as_str().unwrap_or_default().to_lowercase();
                if self.failing_to.lock().unwrap().contains(&to) {
                    return Err(ProviderError::from_code(4001, "User denied transaction signature."));
                }
                let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!(format!("0x{:064x}", n)))
            }
            "eth_getTransactionReceipt" => {
                let hash = params[0].as_str().unwrap_or_default();
                Ok(self.receipts.lock().unwrap().get(hash).cloned().unwrap_or(Value::Null))
            }
            "wallet_sendCalls" if self.batch.load(Ordering::SeqCst) => Ok(json!({"id": "bundle-1"})),
            "wallet_getCallsStatus" if self.batch.load(Ordering::SeqCst) => {
                let id = params[0].as_str().unwrap_or_default();
                Ok(self
                    .bundles
                    .lock()
                    .unwrap()
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| json!({"status": 100})))
            }
            other => Err(ProviderError::from_code(4200, format!("{} not supported", other))),
        }
    }
}

impl ProviderHandle for MockProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn request(&self, method: &str, params: Value) -> BoxFuture<'_, ProviderResult<Value>> {
        let method = method.to_string();
        Box::pin(async move {
            self.calls.lock().unwrap().push((method.clone(), params.clone()));
            let delay = self.delays.lock().unwrap().get(&method).copied();
            if let Some(ms) = delay {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            self.respond(&method, &params)
        })
    }

    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            batch_calls: self.batch.load(Ordering::SeqCst),
            events: true,
        }
    }
}

/// Source that stays empty until its n-th probe.
pub struct LateSource {
    name: String,
    handle: Arc<MockProvider>,
    ready_on: u32,
    probes: AtomicU32,
}

impl LateSource {
    pub fn new(name: &str, handle: Arc<MockProvider>, ready_on: u32) -> Self {
        Self {
            name: name.to_string(),
            handle,
            ready_on,
            probes: AtomicU32::new(0),
        }
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ProviderSource for LateSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Probe {
        let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.ready_on {
            Probe::Ready(self.handle.clone())
        } else {
            Probe::Empty
        }
    }
}

/// Window stand-in that records everything posted to it.
#[derive(Default)]
pub struct RecordingWindow {
    posted: Mutex<Vec<PostedMessage>>,
}

impl RecordingWindow {
    pub fn posted(&self) -> Vec<PostedMessage> {
        self.posted.lock().unwrap().clone()
    }
}

impl MessageTarget for RecordingWindow {
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), BrokerError> {
        self.posted.lock().unwrap().push(PostedMessage {
            data,
            target_origin: target_origin.to_string(),
        });
        Ok(())
    }
}

/// Millisecond-scale timings.
pub fn fast_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.discovery.max_attempts = 5;
    config.discovery.base_delay_ms = 2;
    config.discovery.max_delay_ms = 10;
    config.broker.request_timeout_ms = 200;
    config.connection.balance_timeout_ms = 200;
    config.transactions.confirmation_poll_ms = 5;
    config.transactions.confirmation_timeout_secs = 5;
    config
}

pub fn bridge_with(provider: Arc<MockProvider>) -> Arc<WalletBridge> {
    bridge_with_config(provider, fast_config())
}

pub fn bridge_with_config(provider: Arc<MockProvider>, config: BridgeConfig) -> Arc<WalletBridge> {
    let source: Arc<dyn ProviderSource> = Arc::new(LateSource::new("host", provider, 1));
    WalletBridge::new(config, vec![source], None)
}

/// Collect every event the bridge publishes.
pub fn record_events(bridge: &WalletBridge) -> Arc<Mutex<Vec<WalletEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    bridge.on_any(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

pub fn count(events: &Mutex<Vec<WalletEvent>>, name: &str) -> usize {
    events.lock().unwrap().iter().filter(|e| e.name() == name).count()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Run `fut` with a generous upper bound so a hung test fails instead of stalling.
pub async fn bounded<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("test future did not complete in time")
}

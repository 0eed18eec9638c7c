//! The wallet bridge facade.
//!
//! Owns one instance of every subsystem and wires them together:
//!
//! ```text
//!   sources ─▶ ProviderDiscovery ─▶ BindingGuard ─▶ ProviderProxy
//!                                                        │
//!        provider events ─▶ ConnectionManager ◀──────────┤
//!                                 │                      │
//!                                 ▼                      ▼
//!   callers ◀── WalletEventBus ◀──┴── TransactionDispatcher
//!                   │
//!                   ├─▶ NoiseController (walletError, balanceError, listener panics)
//!                   └─▶ MessageBroker::broadcast_to_parent (session changes)
//! ```
//!
//! UI and business logic talk to this type only; raw provider handles never
//! leave the guard.

use arc_swap::ArcSwapOption;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::broker::{MessageBroker, MessageTarget};
use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, ConnectionResult, ConnectionState};
use crate::discovery::{Discovered, DiscoveryOutcome, HostContext, ProviderDiscovery, ProviderSource};
use crate::events::{DisconnectReason, Subscription, WalletEvent, WalletEventBus};
use crate::guard::{BindingGuard, ProviderProxy};
use crate::lifecycle::Shutdown;
use crate::noise::{ErrorStats, NoiseController, RecoveryTrigger, ReportOutcome};
use crate::origin::{self, OriginPolicy, SharedOriginPolicy};
use crate::provider::{ProviderEvent, ProviderHandle};
use crate::transactions::{BatchResult, DispatchResult, TransactionDispatcher, TransactionRequest, TransactionResult, TxStatus};

/// Diagnostic summary served by the admin endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub status: &'static str,
    pub provider_source: Option<String>,
    pub proxy_id: Option<String>,
    pub discovery_probes: u64,
    pub redefinitions_blocked: u64,
    pub pending_requests: usize,
    pub tracked_transactions: usize,
    pub allowed_origins: usize,
    pub errors_reported: u64,
    pub shutting_down: bool,
}

/// Coordination layer entry point.
pub struct WalletBridge {
    bus: Arc<WalletEventBus>,
    guard: Arc<BindingGuard>,
    proxy: Arc<ProviderProxy>,
    discovery: Arc<ProviderDiscovery>,
    discovery_lock: tokio::sync::Mutex<()>,
    connection: Arc<ConnectionManager>,
    dispatcher: TransactionDispatcher,
    broker: Arc<MessageBroker>,
    noise: Arc<NoiseController>,
    host_context: ArcSwapOption<HostContext>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Shutdown,
}

impl WalletBridge {
    /// Build and wire every subsystem. `sources` are in priority order.
    /// Nothing runs until `start`.
    pub fn new(
        config: BridgeConfig,
        sources: Vec<Arc<dyn ProviderSource>>,
        parent: Option<Arc<dyn MessageTarget>>,
    ) -> Arc<Self> {
        let policy = origin::shared(OriginPolicy::new(&config.origins.allowed));
        Self::with_policy(config, sources, parent, policy)
    }

    /// Like `new`, sharing an allow-list the caller can swap at runtime.
    pub fn with_policy(
        config: BridgeConfig,
        sources: Vec<Arc<dyn ProviderSource>>,
        parent: Option<Arc<dyn MessageTarget>>,
        policy: SharedOriginPolicy,
    ) -> Arc<Self> {
        let bus = Arc::new(WalletEventBus::new());
        let guard = Arc::new(BindingGuard::new(config.guard.clone()));
        let proxy = guard.install();
        let discovery = Arc::new(ProviderDiscovery::new(sources, config.discovery.clone(), Arc::clone(&guard)));
        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&proxy),
            Arc::clone(&bus),
            config.connection.clone(),
        ));
        let shutdown = Shutdown::new();
        let dispatcher = TransactionDispatcher::new(
            Arc::clone(&proxy),
            Arc::clone(&connection),
            Arc::clone(&bus),
            config.transactions.clone(),
            shutdown.clone(),
        );

        let mut broker = MessageBroker::new(policy, config.broker.clone());
        if let Some(parent) = parent {
            broker = broker.with_parent(parent);
        }
        let broker = Arc::new(broker);
        let noise = Arc::new(NoiseController::new(config.noise.clone()));

        let bridge = Arc::new(Self {
            bus,
            guard,
            proxy,
            discovery,
            discovery_lock: tokio::sync::Mutex::new(()),
            connection,
            dispatcher,
            broker,
            noise,
            host_context: ArcSwapOption::empty(),
            watch_task: Mutex::new(None),
            shutdown,
        });
        bridge.wire();
        bridge
    }

    fn wire(&self) {
        let noise = Arc::clone(&self.noise);
        self.bus.set_panic_hook(move |topic| {
            noise.report(&format!("event subscriber panicked on {}", topic));
        });

        let noise = Arc::clone(&self.noise);
        self.bus.on("walletError", move |event| {
            if let WalletEvent::WalletError { message } = event {
                noise.report(message);
            }
        });
        let noise = Arc::clone(&self.noise);
        self.bus.on("balanceError", move |event| {
            if let WalletEvent::BalanceError { message, .. } = event {
                noise.report(message);
            }
        });

        let broker = Arc::clone(&self.broker);
        self.bus.on_any(move |event| {
            let forward = matches!(
                event,
                WalletEvent::WalletConnected { .. }
                    | WalletEvent::WalletDisconnected { .. }
                    | WalletEvent::AccountChanged { .. }
                    | WalletEvent::ChainChanged { .. }
            );
            if !forward {
                return;
            }
            let payload = serde_json::to_value(event).unwrap_or(Value::Null);
            if let Err(e) = broker.broadcast_to_parent(event.name(), payload) {
                tracing::debug!(event = event.name(), error = %e, "Parent broadcast failed");
            }
        });

        let noise = Arc::downgrade(&self.noise);
        self.guard.set_reporter(move |message| {
            if let Some(noise) = noise.upgrade() {
                noise.report(message);
            }
        });
        let noise = Arc::downgrade(&self.noise);
        self.broker.set_reporter(move |message| {
            if let Some(noise) = noise.upgrade() {
                noise.report(message);
            }
        });

        // "redefin" covers both the host's "Cannot redefine property" and the
        // guard's own "redefinition blocked".
        let guard = Arc::clone(&self.guard);
        self.noise
            .register_recovery("guard.reinstall", RecoveryTrigger::Contains("redefin".into()), move || {
                guard.reinstall();
            });
        let broker = Arc::clone(&self.broker);
        self.noise
            .register_recovery("broker.recover", RecoveryTrigger::Contains("timed out".into()), move || {
                broker.recover();
            });
    }

    /// Run discovery and, when a provider already exposes an authorized
    /// account, connect without prompting.
    pub async fn start(self: &Arc<Self>) -> DiscoveryOutcome {
        self.discover().await
    }

    /// Re-run discovery. Never drops an active session; runs are serialized.
    pub async fn retry_detection(self: &Arc<Self>) -> DiscoveryOutcome {
        self.discover().await
    }

    async fn discover(self: &Arc<Self>) -> DiscoveryOutcome {
        let _running = self.discovery_lock.lock().await;
        if self.shutdown.is_triggered() {
            return DiscoveryOutcome::NotFound { attempts: 0 };
        }

        let outcome = self.discovery.run().await;
        match &outcome {
            DiscoveryOutcome::Found(found) => self.on_found(found).await,
            DiscoveryOutcome::NotFound { attempts } => {
                self.bus.publish(WalletEvent::ProviderNotFound { attempts: *attempts });
            }
        }
        outcome
    }

    async fn on_found(self: &Arc<Self>, found: &Discovered) {
        self.announce(found);
        self.spawn_provider_watch();
        if let Err(e) = self.connection.auto_connect(&found.source).await {
            tracing::debug!(source = %found.source, error = %e, "Automatic connection did not complete");
        }
    }

    fn announce(&self, found: &Discovered) {
        if let Some(context) = &found.context {
            self.host_context.store(Some(Arc::new(context.clone())));
        }
        self.bus.publish(WalletEvent::ProviderDetected {
            source: found.source.clone(),
        });
    }

    /// Replace the provider watch with one bound to the current handle.
    ///
    /// Subscribes before returning so events pushed right after discovery
    /// are not missed.
    fn spawn_provider_watch(self: &Arc<Self>) {
        let mut slot = self.watch_task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let Some(events) = self.proxy.events() else {
            tracing::debug!("Authoritative provider does not push events");
            return;
        };
        let bridge = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { bridge.watch_provider(events).await }));
    }

    /// Forward provider events to the state machine. When the provider
    /// disconnects, probe every source once and follow whatever is found.
    async fn watch_provider(self: Arc<Self>, mut events: broadcast::Receiver<ProviderEvent>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => return,
                    received = events.recv() => match received {
                        Ok(event) => {
                            self.connection.handle_provider_event(&event);
                            if event == ProviderEvent::Disconnect {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped = skipped, "Provider event stream lagged");
                        }
                        Err(RecvError::Closed) => {
                            self.connection.handle_provider_event(&ProviderEvent::Disconnect);
                            break;
                        }
                    },
                }
            }

            let Some(found) = self.discovery.reprobe() else {
                tracing::info!("No provider after disconnect, waiting for retry_detection");
                return;
            };
            self.announce(&found);
            let Some(next) = self.proxy.events() else {
                tracing::debug!(source = %found.source, "Replacement provider does not push events");
                return;
            };
            events = next;
            if let Err(e) = self.connection.auto_connect(&found.source).await {
                tracing::debug!(source = %found.source, error = %e, "Reconnect after re-probe did not complete");
            }
        }
    }

    /// Subscribe to a wallet event by topic name (for example `walletConnected`).
    pub fn on<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        self.bus.on(topic, callback)
    }

    /// Subscribe to every wallet event.
    pub fn on_any<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        self.bus.on_any(callback)
    }

    pub fn get_current_state(&self) -> ConnectionState {
        self.connection.snapshot()
    }

    pub async fn request_connection(&self) -> ConnectionResult<ConnectionState> {
        self.connection.request_connection().await
    }

    /// End the session at the caller's request.
    pub fn disconnect(&self) -> bool {
        self.connection.disconnect(DisconnectReason::Requested)
    }

    pub async fn send_transaction(&self, tx: &TransactionRequest) -> DispatchResult<TransactionResult> {
        self.dispatcher.send_transaction(tx).await
    }

    pub async fn send_batch(&self, calls: &[TransactionRequest]) -> DispatchResult<BatchResult> {
        self.dispatcher.send_batch(calls).await
    }

    pub fn transaction_status(&self, hash: &str) -> Option<TxStatus> {
        self.dispatcher.status(hash)
    }

    pub fn watch_transaction(&self, hash: &str) -> Option<tokio::sync::watch::Receiver<TxStatus>> {
        self.dispatcher.watch(hash)
    }

    /// Feed an intercepted error or warning into the noise controller.
    pub fn report_error(&self, message: &str) -> ReportOutcome {
        self.noise.report(message)
    }

    pub fn get_error_stats(&self) -> ErrorStats {
        self.noise.get_error_stats()
    }

    /// Host identity captured alongside the provider, if the host supplied one.
    pub fn host_context(&self) -> Option<HostContext> {
        self.host_context.load_full().map(|ctx| (*ctx).clone())
    }

    pub fn guard(&self) -> &Arc<BindingGuard> {
        &self.guard
    }

    pub fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }

    pub fn origin_policy(&self) -> SharedOriginPolicy {
        self.broker.policy()
    }

    pub fn status(&self) -> BridgeStatus {
        let authoritative = self.proxy.authoritative();
        BridgeStatus {
            status: self.connection.status().as_str(),
            provider_source: authoritative.as_ref().map(|a| a.source.clone()),
            proxy_id: self.guard.slot().map(|p| p.id().to_string()),
            discovery_probes: self.discovery.probe_count(),
            redefinitions_blocked: self.guard.redefinition_count(),
            pending_requests: self.broker.pending_count(),
            tracked_transactions: self.dispatcher.tracked_count(),
            allowed_origins: self.broker.policy().load().len(),
            errors_reported: self.noise.get_error_stats().total,
            shutting_down: self.shutdown.is_triggered(),
        }
    }

    /// Best-effort unload: stop background tasks, end the session, reject
    /// in-flight broker requests and drop the authoritative handle.
    pub fn teardown(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        if let Some(task) = self.watch_task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        self.connection.disconnect(DisconnectReason::Teardown);
        self.broker.close();
        self.guard.release();
        self.bus.clear();
        tracing::info!("Wallet bridge torn down");
    }
}

impl std::fmt::Debug for WalletBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletBridge")
            .field("state", &self.connection.status())
            .field("guard", &self.guard)
            .field("broker", &self.broker)
            .finish()
    }
}

//! Single-owner guard for the ambient provider slot.
//!
//! # Invariants
//! - The slot's observable identity (`ProviderProxy::id`) is fixed by the
//!   first `install` and never changes afterwards.
//! - External redefinition attempts are dropped and counted, never applied
//!   and never raised as errors.
//! - Only `adopt` and `release` write the authoritative handle.

use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::config::GuardConfig;
use crate::connection::state::now_millis;
use crate::guard::proxy::{Authoritative, ProviderProxy};
use crate::guard::scanner::{ScriptNode, ScriptScanner};
use crate::noise::ErrorReporter;
use crate::observability::metrics;
use crate::provider::ProviderHandle;

/// Result of an intercepted redefinition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redefinition {
    /// The guard is installed; the attempt was dropped.
    Blocked { total: u64 },
    /// Nothing installed yet; the attempt was dropped but nothing was protected.
    NotInstalled,
}

/// Counts redefinition attempts per window and warns at most once per window.
#[derive(Debug)]
struct RedefinitionWindow {
    started: Instant,
    in_window: u32,
    warned: bool,
    total: u64,
}

impl RedefinitionWindow {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            in_window: 0,
            warned: false,
            total: 0,
        }
    }

    /// Record one attempt; returns true if a warning should be emitted now.
    fn record(&mut self, window: Duration, threshold: u32) -> bool {
        let now = Instant::now();
        if now.duration_since(self.started) > window {
            self.started = now;
            self.in_window = 0;
            self.warned = false;
        }
        self.in_window += 1;
        self.total += 1;

        if self.in_window > threshold && !self.warned {
            self.warned = true;
            true
        } else {
            false
        }
    }
}

/// Owner of the guarded provider slot.
pub struct BindingGuard {
    config: GuardConfig,
    installed: OnceLock<Arc<ProviderProxy>>,
    authoritative: Arc<ArcSwapOption<Authoritative>>,
    redefinitions: Mutex<RedefinitionWindow>,
    scanner: ScriptScanner,
    reporter: OnceLock<ErrorReporter>,
}

impl BindingGuard {
    pub fn new(config: GuardConfig) -> Self {
        let scanner = ScriptScanner::new(config.script_signatures.iter());
        Self {
            config,
            installed: OnceLock::new(),
            authoritative: Arc::new(ArcSwapOption::empty()),
            redefinitions: Mutex::new(RedefinitionWindow::new()),
            scanner,
            reporter: OnceLock::new(),
        }
    }

    /// Route the repeated-redefinition diagnostic to an error sink. Only the
    /// first call takes effect.
    pub fn set_reporter<F>(&self, reporter: F) -> bool
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.reporter.set(Box::new(reporter)).is_ok()
    }

    /// Install the proxy in the slot. Idempotent: later calls return the
    /// same proxy.
    pub fn install(&self) -> Arc<ProviderProxy> {
        let mut fresh = false;
        let proxy = self.installed.get_or_init(|| {
            fresh = true;
            Arc::new(ProviderProxy::new(
                self.config.slot_name.clone(),
                Arc::clone(&self.authoritative),
            ))
        });
        if fresh {
            tracing::info!(slot = %self.config.slot_name, proxy_id = %proxy.id(), "Binding guard installed");
        }
        Arc::clone(proxy)
    }

    /// Re-assert the installed proxy (auto-recovery). Never changes identity.
    pub fn reinstall(&self) -> Arc<ProviderProxy> {
        let proxy = self.install();
        tracing::debug!(slot = %self.config.slot_name, proxy_id = %proxy.id(), "Binding guard re-asserted");
        proxy
    }

    /// Read-only accessor for the slot.
    pub fn slot(&self) -> Option<Arc<ProviderProxy>> {
        self.installed.get().cloned()
    }

    /// Intercept an external attempt to redefine the slot.
    ///
    /// `actor` identifies the offending script for diagnostics; the value is
    /// dropped.
    pub fn define_slot(&self, actor: &str, _value: Arc<dyn ProviderHandle>) -> Redefinition {
        if self.installed.get().is_none() {
            tracing::debug!(actor = actor, "Redefinition attempt before install, dropped");
            return Redefinition::NotInstalled;
        }

        metrics::record_redefinition_blocked();
        let window = Duration::from_millis(self.config.redefinition_window_ms);
        let (warn, total) = match self.redefinitions.lock() {
            Ok(mut counter) => {
                let warn = counter.record(window, self.config.redefinition_warn_threshold);
                (warn, counter.total)
            }
            Err(_) => (false, 0),
        };

        if warn {
            tracing::warn!(
                slot = %self.config.slot_name,
                actor = actor,
                threshold = self.config.redefinition_warn_threshold,
                window_ms = self.config.redefinition_window_ms,
                "Repeated attempts to redefine the provider slot are being blocked"
            );
            if let Some(report) = self.reporter.get() {
                report(&format!("{} redefinition blocked repeatedly", self.config.slot_name));
            }
        } else {
            tracing::trace!(actor = actor, total = total, "Redefinition attempt blocked");
        }
        Redefinition::Blocked { total }
    }

    /// Total redefinition attempts blocked since creation.
    pub fn redefinition_count(&self) -> u64 {
        self.redefinitions.lock().map(|c| c.total).unwrap_or(0)
    }

    /// Make `handle` authoritative. Returns the source it replaced, if any.
    pub fn adopt(&self, source: &str, handle: Arc<dyn ProviderHandle>) -> Option<String> {
        let next = Arc::new(Authoritative {
            source: source.to_string(),
            handle,
            adopted_at: now_millis(),
        });
        let previous = self.authoritative.swap(Some(next)).map(|p| p.source.clone());
        match &previous {
            Some(prev) if prev != source => {
                tracing::info!(previous = %prev, source = source, "Authoritative provider replaced")
            }
            Some(_) => tracing::debug!(source = source, "Authoritative provider refreshed"),
            None => tracing::info!(source = source, "Authoritative provider adopted"),
        }
        previous
    }

    /// Drop the authoritative handle (teardown).
    pub fn release(&self) {
        if let Some(prev) = self.authoritative.swap(None) {
            tracing::info!(source = %prev.source, "Authoritative provider released");
        }
    }

    pub fn authoritative(&self) -> Option<Arc<Authoritative>> {
        self.authoritative.load_full()
    }

    /// Remove competing injection scripts from a batch of newly inserted
    /// nodes, returning the nodes that may run.
    pub fn filter_inserted(&self, nodes: Vec<ScriptNode>) -> Vec<ScriptNode> {
        nodes
            .into_iter()
            .filter(|node| match self.scanner.matched_signature(node) {
                Some(signature) => {
                    metrics::record_script_removed();
                    tracing::info!(node = %node.id, signature = signature, "Removed competing wallet injection script");
                    false
                }
                None => true,
            })
            .collect()
    }
}

impl std::fmt::Debug for BindingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingGuard")
            .field("slot", &self.config.slot_name)
            .field("installed", &self.installed.get().map(|p| p.id()))
            .field("authoritative", &self.authoritative.load_full().map(|a| a.source.clone()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, ProviderResult};
    use futures_util::future::BoxFuture;
    use serde_json::{json, Value};

    struct Echo(&'static str);

    impl ProviderHandle for Echo {
        fn label(&self) -> &str {
            self.0
        }

        fn request(&self, method: &str, _params: Value) -> BoxFuture<'_, ProviderResult<Value>> {
            let reply = json!({ "from": self.0, "method": method });
            Box::pin(async move { Ok(reply) })
        }
    }

    fn guard() -> BindingGuard {
        BindingGuard::new(GuardConfig {
            redefinition_warn_threshold: 2,
            ..GuardConfig::default()
        })
    }

    #[test]
    fn test_install_is_idempotent() {
        let guard = guard();
        assert!(guard.slot().is_none());
        let first = guard.install();
        let second = guard.install();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(guard.reinstall().id(), first.id());
    }

    #[test]
    fn test_redefinitions_never_change_identity() {
        let guard = guard();
        assert_eq!(guard.define_slot("early", Arc::new(Echo("rogue"))), Redefinition::NotInstalled);

        let proxy = guard.install();
        for i in 0..25 {
            let outcome = guard.define_slot("rogue-script", Arc::new(Echo("rogue")));
            assert_eq!(outcome, Redefinition::Blocked { total: i + 1 });
            assert_eq!(guard.slot().unwrap().id(), proxy.id());
        }
        assert_eq!(guard.redefinition_count(), 25);
        assert!(guard.authoritative().is_none());
    }

    #[test]
    fn test_threshold_crossing_is_reported_once() {
        let guard = guard();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        assert!(guard.set_reporter(move |message| sink.lock().unwrap().push(message.to_string())));

        guard.install();
        for _ in 0..10 {
            guard.define_slot("rogue-script", Arc::new(Echo("rogue")));
        }
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0], "ethereum redefinition blocked repeatedly");
    }

    #[test]
    fn test_warning_once_per_window() {
        let mut window = RedefinitionWindow::new();
        let span = Duration::from_secs(60);
        let warnings: Vec<bool> = (0..6).map(|_| window.record(span, 2)).collect();
        assert_eq!(warnings, vec![false, false, true, false, false, false]);
    }

    #[tokio::test]
    async fn test_proxy_routes_to_authoritative() {
        let guard = guard();
        let proxy = guard.install();

        let err = proxy.request("eth_accounts", json!([])).await.unwrap_err();
        assert_eq!(err, ProviderError::Unavailable);

        assert_eq!(guard.adopt("host", Arc::new(Echo("host"))), None);
        let reply = proxy.request("eth_accounts", json!([])).await.unwrap();
        assert_eq!(reply["from"], "host");

        assert_eq!(guard.adopt("injected", Arc::new(Echo("injected"))), Some("host".to_string()));
        let reply = proxy.request("eth_chainId", json!([])).await.unwrap();
        assert_eq!(reply["from"], "injected");
    }

    #[tokio::test]
    async fn test_proxy_rejects_unrecognized_methods() {
        let guard = guard();
        let proxy = guard.install();
        guard.adopt("host", Arc::new(Echo("host")));

        let err = proxy.request("debug_setHead", json!([])).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedMethod(m) if m == "debug_setHead"));
    }

    #[test]
    fn test_filter_inserted_scripts() {
        let guard = guard();
        let kept = guard.filter_inserted(vec![
            ScriptNode::inline("a", "window.ethereum = fake;"),
            ScriptNode::external("b", "https://cdn.example/app.js"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "b");
    }
}

//! Bounded polling over provider sources.
//!
//! # State Transitions
//! ```text
//! Polling(attempt) → Found: a source in priority order yields a ready provider
//! Polling(attempt) → Polling(attempt + 1): nothing found, wait backoff(attempt)
//! Polling(max_attempts) → NotFound: terminal, caller runs standalone
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::DiscoveryConfig;
use crate::discovery::source::{HostContext, Probe, ProviderSource};
use crate::guard::BindingGuard;
use crate::observability::metrics;
use crate::provider::ProviderHandle;
use crate::resilience::calculate_backoff;

/// A provider found by discovery.
#[derive(Clone)]
pub struct Discovered {
    /// Name of the winning source.
    pub source: String,
    pub handle: Arc<dyn ProviderHandle>,
    pub context: Option<HostContext>,
    /// Attempt on which the provider was found (1-based).
    pub attempts: u32,
    /// Lower-priority sources that were also populated.
    pub shadowed: Vec<String>,
}

impl std::fmt::Debug for Discovered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovered")
            .field("source", &self.source)
            .field("provider", &self.handle.label())
            .field("attempts", &self.attempts)
            .field("shadowed", &self.shadowed)
            .finish()
    }
}

/// Terminal result of a discovery run.
#[derive(Debug, Clone)]
pub enum DiscoveryOutcome {
    Found(Discovered),
    /// No host wallet available; not an error.
    NotFound { attempts: u32 },
}

impl DiscoveryOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, DiscoveryOutcome::Found(_))
    }
}

/// Polls sources in priority order and hands the winner to the guard.
pub struct ProviderDiscovery {
    sources: Vec<Arc<dyn ProviderSource>>,
    config: DiscoveryConfig,
    guard: Arc<BindingGuard>,
    probes: AtomicU64,
}

impl ProviderDiscovery {
    /// `sources` are in priority order: the first populated one wins.
    pub fn new(sources: Vec<Arc<dyn ProviderSource>>, config: DiscoveryConfig, guard: Arc<BindingGuard>) -> Self {
        Self {
            sources,
            config,
            guard,
            probes: AtomicU64::new(0),
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Total source passes performed, across runs.
    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    /// One pass over every source. Does not adopt.
    fn scan(&self, attempt: u32) -> Option<Discovered> {
        self.probes.fetch_add(1, Ordering::Relaxed);

        let mut winner: Option<(&Arc<dyn ProviderSource>, Arc<dyn ProviderHandle>)> = None;
        let mut shadowed = Vec::new();

        for source in &self.sources {
            match source.probe() {
                Probe::Ready(handle) if handle.is_ready() => {
                    if winner.is_none() {
                        winner = Some((source, handle));
                    } else {
                        shadowed.push(source.name().to_string());
                    }
                }
                Probe::Ready(handle) => {
                    tracing::debug!(source = source.name(), provider = handle.label(), "Provider present but not ready");
                }
                Probe::Unusable(reason) => {
                    tracing::debug!(source = source.name(), reason = %reason, "Ignoring unusable provider candidate");
                }
                Probe::Empty => {}
            }
        }

        let (source, handle) = winner?;
        if !shadowed.is_empty() {
            tracing::info!(
                winner = source.name(),
                shadowed = ?shadowed,
                "Multiple providers present, using highest priority source"
            );
        }

        Some(Discovered {
            source: source.name().to_string(),
            handle,
            context: source.context(),
            attempts: attempt,
            shadowed,
        })
    }

    fn adopt(&self, found: &Discovered) {
        self.guard.adopt(&found.source, Arc::clone(&found.handle));
    }

    /// Poll with bounded exponential backoff until a provider is found or
    /// attempts are exhausted.
    pub async fn run(&self) -> DiscoveryOutcome {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if let Some(found) = self.scan(attempt) {
                metrics::record_discovery_attempt(true);
                self.adopt(&found);
                tracing::info!(
                    source = %found.source,
                    provider = found.handle.label(),
                    attempt = attempt,
                    "Wallet provider discovered"
                );
                return DiscoveryOutcome::Found(found);
            }
            metrics::record_discovery_attempt(false);

            if attempt < max_attempts {
                let delay = calculate_backoff(attempt, self.config.base_delay_ms, self.config.max_delay_ms);
                tracing::debug!(attempt = attempt, delay_ms = delay.as_millis() as u64, "No provider yet, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(attempts = max_attempts, "No wallet provider found, continuing in standalone mode");
        DiscoveryOutcome::NotFound {
            attempts: max_attempts,
        }
    }

    /// Single pass used by watch mode after the current provider goes away.
    pub fn reprobe(&self) -> Option<Discovered> {
        let found = self.scan(1)?;
        self.adopt(&found);
        tracing::info!(source = %found.source, "Provider re-acquired by watch");
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::provider::ProviderResult;
    use futures_util::future::BoxFuture;
    use serde_json::Value;
    use std::sync::atomic::AtomicU32;

    struct Named(&'static str, bool);

    impl ProviderHandle for Named {
        fn label(&self) -> &str {
            self.0
        }

        fn request(&self, _method: &str, _params: Value) -> BoxFuture<'_, ProviderResult<Value>> {
            Box::pin(async { Ok(Value::Null) })
        }

        fn is_ready(&self) -> bool {
            self.1
        }
    }

    /// Becomes populated on the n-th probe.
    struct LateSource {
        name: &'static str,
        ready_on: u32,
        probes: AtomicU32,
    }

    impl ProviderSource for LateSource {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self) -> Probe {
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.ready_on {
                Probe::Ready(Arc::new(Named(self.name, true)))
            } else {
                Probe::Empty
            }
        }
    }

    fn fast_config(max_attempts: u32) -> DiscoveryConfig {
        DiscoveryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    fn guard() -> Arc<BindingGuard> {
        let guard = Arc::new(BindingGuard::new(GuardConfig::default()));
        guard.install();
        guard
    }

    #[tokio::test]
    async fn test_found_on_third_attempt() {
        let guard = guard();
        let source = Arc::new(LateSource {
            name: "host",
            ready_on: 3,
            probes: AtomicU32::new(0),
        });
        let discovery = ProviderDiscovery::new(vec![source.clone() as Arc<dyn ProviderSource>], fast_config(5), guard.clone());

        match discovery.run().await {
            DiscoveryOutcome::Found(found) => {
                assert_eq!(found.attempts, 3);
                assert_eq!(found.source, "host");
            }
            other => panic!("expected provider, got {:?}", other),
        }
        assert_eq!(source.probes.load(Ordering::SeqCst), 3);
        assert_eq!(guard.authoritative().unwrap().source, "host");
    }

    #[tokio::test]
    async fn test_not_found_after_max_attempts() {
        let guard = guard();
        let source = Arc::new(LateSource {
            name: "never",
            ready_on: u32::MAX,
            probes: AtomicU32::new(0),
        });
        let discovery = ProviderDiscovery::new(vec![source.clone() as Arc<dyn ProviderSource>], fast_config(4), guard.clone());

        assert!(matches!(discovery.run().await, DiscoveryOutcome::NotFound { attempts: 4 }));
        assert_eq!(source.probes.load(Ordering::SeqCst), 4);
        assert!(guard.authoritative().is_none());
    }

    #[tokio::test]
    async fn test_priority_order_wins() {
        use crate::discovery::source::StaticSource;

        let guard = guard();
        let sources: Vec<Arc<dyn ProviderSource>> = vec![
            Arc::new(StaticSource::new("host", Arc::new(Named("host", true)))),
            Arc::new(StaticSource::new("injected", Arc::new(Named("injected", true)))),
        ];
        let discovery = ProviderDiscovery::new(sources, fast_config(1), guard.clone());

        let DiscoveryOutcome::Found(found) = discovery.run().await else {
            panic!("expected provider");
        };
        assert_eq!(found.source, "host");
        assert_eq!(found.shadowed, vec!["injected".to_string()]);
        assert_eq!(guard.authoritative().unwrap().handle.label(), "host");
    }

    #[tokio::test]
    async fn test_not_ready_candidates_are_skipped() {
        use crate::discovery::source::StaticSource;

        let guard = guard();
        let sources: Vec<Arc<dyn ProviderSource>> = vec![
            Arc::new(StaticSource::new("host", Arc::new(Named("host", false)))),
            Arc::new(StaticSource::new("injected", Arc::new(Named("injected", true)))),
        ];
        let discovery = ProviderDiscovery::new(sources, fast_config(1), guard);

        let DiscoveryOutcome::Found(found) = discovery.run().await else {
            panic!("expected provider");
        };
        assert_eq!(found.source, "injected");
        assert!(found.shadowed.is_empty());
    }
}

//! Hot reload of the bridge configuration.
//!
//! Only the origin allow-list takes effect while running. Changes to any
//! other section are reported as needing a restart and otherwise ignored.

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::loader::load_config;
use crate::config::schema::BridgeConfig;
use crate::origin::{OriginPolicy, SharedOriginPolicy};

/// What a reload changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// The allow-list was swapped.
    pub origins_swapped: bool,
    /// Sections that changed on disk but only apply after a restart.
    pub restart_required: Vec<&'static str>,
}

fn differs<T: Serialize>(a: &T, b: &T) -> bool {
    serde_json::to_value(a).ok() != serde_json::to_value(b).ok()
}

/// Apply `next` on top of `current`: swap the allow-list when it changed and
/// list the sections that cannot change in place.
pub fn apply_reload(policy: &SharedOriginPolicy, current: &BridgeConfig, next: &BridgeConfig) -> ReloadOutcome {
    let mut outcome = ReloadOutcome::default();

    if differs(&current.origins, &next.origins) {
        let allowed = OriginPolicy::new(&next.origins.allowed);
        tracing::info!(origins = allowed.len(), "Origin allow-list reloaded");
        policy.store(Arc::new(allowed));
        outcome.origins_swapped = true;
    }

    let sections = [
        ("discovery", differs(&current.discovery, &next.discovery)),
        ("guard", differs(&current.guard, &next.guard)),
        ("broker", differs(&current.broker, &next.broker)),
        ("connection", differs(&current.connection, &next.connection)),
        ("transactions", differs(&current.transactions, &next.transactions)),
        ("noise", differs(&current.noise, &next.noise)),
        ("observability", differs(&current.observability, &next.observability)),
        ("admin", differs(&current.admin, &next.admin)),
        ("sources", differs(&current.sources, &next.sources)),
    ];
    outcome.restart_required = sections
        .into_iter()
        .filter_map(|(name, changed)| changed.then_some(name))
        .collect();
    if !outcome.restart_required.is_empty() {
        tracing::warn!(sections = ?outcome.restart_required, "Config sections changed; restart to apply");
    }
    outcome
}

/// Watches the config file and applies each valid revision.
pub struct ConfigWatcher {
    path: PathBuf,
    current: Arc<ArcSwap<BridgeConfig>>,
    policy: SharedOriginPolicy,
}

impl ConfigWatcher {
    /// `initial` is the configuration the bridge was built from.
    pub fn new(path: &Path, initial: BridgeConfig, policy: SharedOriginPolicy) -> Self {
        Self {
            path: path.to_path_buf(),
            current: Arc::new(ArcSwap::from_pointee(initial)),
            policy,
        }
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let current = Arc::clone(&self.current);
        let policy = Arc::clone(&self.policy);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?path, "Config file change detected, reloading");
                    match load_config(&path) {
                        Ok(next) => {
                            apply_reload(&policy, &current.load(), &next);
                            current.store(Arc::new(next));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

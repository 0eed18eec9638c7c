//! Provider sources: the known injection locations discovery polls.
//!
//! Sources are injected into discovery in priority order instead of being
//! looked up from ambient globals.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::provider::ProviderHandle;

/// Identity of the user as supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostUser {
    pub fid: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub pfp_url: Option<String>,
}

/// Metadata about the embedding client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub client_fid: Option<u64>,
    /// Whether the user has added this app to their client.
    #[serde(default)]
    pub added: bool,
}

/// Host/frame context read alongside the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostContext {
    #[serde(default)]
    pub user: Option<HostUser>,
    #[serde(default)]
    pub client: Option<ClientInfo>,
}

/// What a single probe of a source found.
pub enum Probe {
    /// Nothing injected yet.
    Empty,
    /// Something is there but lacks the required capability set.
    Unusable(String),
    /// A usable provider.
    Ready(Arc<dyn ProviderHandle>),
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Probe::Empty => f.write_str("Empty"),
            Probe::Unusable(reason) => f.debug_tuple("Unusable").field(reason).finish(),
            Probe::Ready(handle) => f.debug_tuple("Ready").field(&handle.label()).finish(),
        }
    }
}

/// A location where a provider may appear.
pub trait ProviderSource: Send + Sync {
    fn name(&self) -> &str;

    /// Look for a provider. Must not mutate host-owned state.
    fn probe(&self) -> Probe;

    /// Host context published alongside the provider, cloned on read.
    fn context(&self) -> Option<HostContext> {
        None
    }
}

/// A source that always holds the same provider (e.g. a configured node).
pub struct StaticSource {
    name: String,
    handle: Arc<dyn ProviderHandle>,
    context: Option<HostContext>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, handle: Arc<dyn ProviderHandle>) -> Self {
        Self {
            name: name.into(),
            handle,
            context: None,
        }
    }

    pub fn with_context(mut self, context: HostContext) -> Self {
        self.context = Some(context);
        self
    }
}

impl ProviderSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Probe {
        Probe::Ready(Arc::clone(&self.handle))
    }

    fn context(&self) -> Option<HostContext> {
        self.context.clone()
    }
}

/// A location that the host or a wallet extension populates at some
/// unknown later time.
#[derive(Clone)]
pub struct InjectionPoint {
    name: String,
    slot: Arc<RwLock<Option<Arc<dyn ProviderHandle>>>>,
    context: Arc<RwLock<Option<HostContext>>>,
}

impl InjectionPoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: Arc::new(RwLock::new(None)),
            context: Arc::new(RwLock::new(None)),
        }
    }

    /// Called by the injecting party.
    pub fn inject(&self, handle: Arc<dyn ProviderHandle>) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(handle);
        }
    }

    /// Called by the injecting party.
    pub fn publish_context(&self, context: HostContext) {
        if let Ok(mut ctx) = self.context.write() {
            *ctx = Some(context);
        }
    }

    /// Called by the injecting party when it withdraws its provider.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}

impl ProviderSource for InjectionPoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Probe {
        match self.slot.read() {
            Ok(slot) => match slot.as_ref() {
                Some(handle) => Probe::Ready(Arc::clone(handle)),
                None => Probe::Empty,
            },
            Err(_) => Probe::Unusable("injection slot lock poisoned".to_string()),
        }
    }

    fn context(&self) -> Option<HostContext> {
        self.context.read().ok().and_then(|c| c.clone())
    }
}

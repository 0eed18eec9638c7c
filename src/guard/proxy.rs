//! The safe proxy installed in the guarded slot.

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::provider::{Capabilities, ProviderError, ProviderEvent, ProviderHandle, ProviderResult, WalletMethod};

/// The provider currently trusted to service wallet requests.
pub struct Authoritative {
    /// Discovery source that supplied the handle.
    pub source: String,
    pub handle: Arc<dyn ProviderHandle>,
    /// Milliseconds since epoch when the guard adopted it.
    pub adopted_at: u64,
}

impl std::fmt::Debug for Authoritative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authoritative")
            .field("source", &self.source)
            .field("provider", &self.handle.label())
            .field("adopted_at", &self.adopted_at)
            .finish()
    }
}

/// Forwards recognized wallet methods to whichever handle is authoritative.
///
/// The proxy's identity never changes after install; only the handle behind
/// it does.
pub struct ProviderProxy {
    id: Uuid,
    slot_name: String,
    authoritative: Arc<ArcSwapOption<Authoritative>>,
}

impl ProviderProxy {
    pub(crate) fn new(slot_name: String, authoritative: Arc<ArcSwapOption<Authoritative>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_name,
            authoritative,
        }
    }

    /// Stable identity of the installed proxy.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn slot_name(&self) -> &str {
        &self.slot_name
    }

    /// Snapshot of the authoritative handle, if any.
    pub fn authoritative(&self) -> Option<Arc<Authoritative>> {
        self.authoritative.load_full()
    }

    pub fn has_provider(&self) -> bool {
        self.authoritative.load().is_some()
    }

    /// Typed entry point used inside the crate.
    pub async fn call(&self, method: WalletMethod, params: Value) -> ProviderResult<Value> {
        let current = self.authoritative.load_full().ok_or(ProviderError::Unavailable)?;
        tracing::trace!(method = %method, source = %current.source, "Routing wallet request");
        current.handle.request(method.rpc_name(), params).await
    }
}

impl ProviderHandle for ProviderProxy {
    fn label(&self) -> &str {
        &self.slot_name
    }

    fn request(&self, method: &str, params: Value) -> BoxFuture<'_, ProviderResult<Value>> {
        let resolved = WalletMethod::from_rpc_name(method);
        let method = method.to_string();
        Box::pin(async move {
            match resolved {
                Some(m) => self.call(m, params).await,
                None => {
                    tracing::debug!(method = %method, "Rejecting unsupported method at proxy");
                    Err(ProviderError::UnsupportedMethod(method))
                }
            }
        })
    }

    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.authoritative.load_full().and_then(|a| a.handle.events())
    }

    fn capabilities(&self) -> Capabilities {
        self.authoritative
            .load_full()
            .map(|a| a.handle.capabilities())
            .unwrap_or_default()
    }

    fn is_ready(&self) -> bool {
        self.has_provider()
    }
}

impl std::fmt::Debug for ProviderProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderProxy")
            .field("id", &self.id)
            .field("slot", &self.slot_name)
            .field("authoritative", &self.authoritative.load_full().map(|a| a.source.clone()))
            .finish()
    }
}

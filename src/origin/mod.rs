//! Origin policy for cross-context messages.
//!
//! The policy is held behind an `ArcSwap` so a reloaded allow-list becomes
//! visible to every broker without locking the inbound path.

pub mod policy;

use arc_swap::ArcSwap;
use std::sync::Arc;

pub use policy::{OriginPattern, OriginPolicy};

/// Hot-swappable origin policy shared by brokers.
pub type SharedOriginPolicy = Arc<ArcSwap<OriginPolicy>>;

/// Wrap a policy for sharing.
pub fn shared(policy: OriginPolicy) -> SharedOriginPolicy {
    Arc::new(ArcSwap::from_pointee(policy))
}

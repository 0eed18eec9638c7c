//! Provider discovery.
//!
//! # Data Flow
//! ```text
//! ordered sources (source.rs)
//!     → poller.rs run(): probe all, first ready wins, backoff between passes
//!     → BindingGuard::adopt (winner becomes authoritative)
//!     → Discovered { handle, host context } to the connection layer
//!
//! Watch mode (after Found):
//!     provider `disconnect` event → reprobe() once, no polling
//! ```
//!
//! # Design Decisions
//! - A bounded loop with an explicit attempt counter; `NotFound` is terminal
//! - `NotFound` means standalone mode, never a hard error
//! - Host context is cloned out of the source, never written back

pub mod poller;
pub mod source;

pub use poller::{Discovered, DiscoveryOutcome, ProviderDiscovery};
pub use source::{ClientInfo, HostContext, HostUser, InjectionPoint, Probe, ProviderSource, StaticSource};

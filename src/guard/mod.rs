//! Global binding guard.
//!
//! # Data Flow
//! ```text
//! install()
//!     → proxy.rs (ProviderProxy in the slot, fixed identity)
//!
//! discovery hands over a handle
//!     → binding.rs adopt() (the only writer of the authoritative handle)
//!     → proxy forwards recognized wallet methods to it
//!
//! third-party scripts
//!     → define_slot(): dropped + counted, throttled warning
//!     → filter_inserted(): scanner.rs removes competing injectors
//! ```

pub mod binding;
pub mod proxy;
pub mod scanner;

pub use binding::{BindingGuard, Redefinition};
pub use proxy::{Authoritative, ProviderProxy};
pub use scanner::{ScriptNode, ScriptScanner};

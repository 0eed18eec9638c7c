//! Event bus shared by the coordination layer.
//!
//! Components receive an `Arc<EventBus<_>>` at construction instead of
//! reaching for a global, so every subsystem can be tested in isolation.

pub mod bus;
pub mod types;

pub use bus::{Callback, EventBus, PanicHook, Subscription};
pub use types::{DisconnectReason, WalletEvent};

/// Bus carrying wallet events, keyed by `WalletEvent::name`.
pub type WalletEventBus = EventBus<WalletEvent>;

impl EventBus<WalletEvent> {
    /// Emit a wallet event under its own topic name.
    pub fn publish(&self, event: WalletEvent) -> usize {
        self.emit(event.name(), &event)
    }
}

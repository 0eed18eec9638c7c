//! Cross-origin message broker.
//!
//! # Data Flow
//! ```text
//! send(target, type, payload)
//!     → requestId = req-{counter}-{random}
//!     → PendingRequest { oneshot, deadline } inserted
//!     → target.post_message(envelope, targetOrigin)
//!     → await oneshot or deadline (exactly one wins)
//!
//! inbound message
//!     → origin allow-list (drop silently on failure)
//!     → requestId pending?  settle it
//!     → requestId settled?  ignore duplicate
//!     → otherwise           broadcast to `type` subscribers
//! ```

#[allow(clippy::module_inception)]
pub mod broker;
pub mod message;
pub mod target;

pub use broker::{BrokerError, BrokerResult, InboundDisposition, MessageBroker};
pub use message::{Envelope, InboundMessage};
pub use target::{ChannelTarget, MessageTarget, PostedMessage};

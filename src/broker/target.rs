//! Window-like targets that accept posted messages.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::broker::BrokerError;

/// Anything accepting `postMessage(data, targetOrigin)`.
pub trait MessageTarget: Send + Sync {
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), BrokerError>;
}

/// A message handed to a [`ChannelTarget`].
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub data: Value,
    pub target_origin: String,
}

/// Target backed by an unbounded channel; the embedding layer drains the
/// receiver and forwards to the real window.
#[derive(Debug, Clone)]
pub struct ChannelTarget {
    tx: mpsc::UnboundedSender<PostedMessage>,
}

impl ChannelTarget {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PostedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageTarget for ChannelTarget {
    fn post_message(&self, data: Value, target_origin: &str) -> Result<(), BrokerError> {
        self.tx
            .send(PostedMessage {
                data,
                target_origin: target_origin.to_string(),
            })
            .map_err(|_| BrokerError::Post("target window is gone".to_string()))
    }
}

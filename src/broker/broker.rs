//! Request/response correlation over posted messages.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};

use crate::broker::message::{Envelope, InboundMessage};
use crate::broker::target::MessageTarget;
use crate::config::BrokerConfig;
use crate::events::{EventBus, Subscription};
use crate::noise::ErrorReporter;
use crate::observability::metrics;
use crate::origin::SharedOriginPolicy;

/// Errors surfaced to callers of [`MessageBroker::send`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// No response arrived before the deadline.
    #[error("request {request_id} timed out after {timeout_ms} ms")]
    Timeout { request_id: String, timeout_ms: u64 },

    /// The broker was closed while the request was in flight.
    #[error("message broker closed")]
    Closed,

    /// The other side answered with an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// The message could not be posted.
    #[error("failed to post message: {0}")]
    Post(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// What `handle_inbound` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundDisposition {
    /// Origin not in the allow-list; nothing ran.
    DroppedOrigin,
    /// Not an envelope.
    Malformed,
    /// Settled the matching pending request.
    Resolved,
    /// A second answer for a request that was already settled.
    Duplicate,
    /// Delivered to `delivered` subscribers of the message type.
    Broadcast { delivered: usize },
}

struct PendingRequest {
    tx: oneshot::Sender<BrokerResult<Value>>,
    deadline: Instant,
    kind: String,
}

/// Correlates outbound requests with inbound responses and fans out
/// everything else to type subscribers.
///
/// Each pending request is settled exactly once: whoever removes it from the
/// map (response, timeout, `recover` or `close`) owns its completion.
pub struct MessageBroker {
    policy: SharedOriginPolicy,
    config: BrokerConfig,
    pending: DashMap<String, PendingRequest>,
    settled: Mutex<VecDeque<String>>,
    subscribers: EventBus<Envelope>,
    parent: Option<Arc<dyn MessageTarget>>,
    counter: AtomicU64,
    closed: AtomicBool,
    reporter: OnceLock<ErrorReporter>,
}

impl MessageBroker {
    pub fn new(policy: SharedOriginPolicy, config: BrokerConfig) -> Self {
        Self {
            policy,
            config,
            pending: DashMap::new(),
            settled: Mutex::new(VecDeque::new()),
            subscribers: EventBus::new(),
            parent: None,
            counter: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            reporter: OnceLock::new(),
        }
    }

    /// Route request timeouts to an error sink. Only the first call takes
    /// effect.
    pub fn set_reporter<F>(&self, reporter: F) -> bool
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.reporter.set(Box::new(reporter)).is_ok()
    }

    /// Attach the embedding (parent) context.
    pub fn with_parent(mut self, parent: Arc<dyn MessageTarget>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// The live allow-list; swapping its contents affects the next message.
    pub fn policy(&self) -> SharedOriginPolicy {
        Arc::clone(&self.policy)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Monotonic counter plus a random suffix; never reused in-process.
    fn next_request_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req-{}-{:08x}", n, fastrand::u32(..))
    }

    fn remember_settled(&self, request_id: String) {
        let mut settled = self.settled.lock().unwrap_or_else(|p| p.into_inner());
        if settled.len() >= self.config.settled_history.max(1) {
            settled.pop_front();
        }
        settled.push_back(request_id);
    }

    fn was_settled(&self, request_id: &str) -> bool {
        let settled = self.settled.lock().unwrap_or_else(|p| p.into_inner());
        settled.iter().any(|id| id == request_id)
    }

    /// Take ownership of a pending request so it can be settled.
    fn take(&self, request_id: &str) -> Option<PendingRequest> {
        let (id, request) = self.pending.remove(request_id)?;
        self.remember_settled(id);
        metrics::set_pending_requests(self.pending.len());
        Some(request)
    }

    /// Post `payload` as a `kind` request and wait for the correlated answer.
    ///
    /// `target_origin` defaults to the configured target origin.
    pub async fn send(
        &self,
        target: &dyn MessageTarget,
        kind: &str,
        payload: Value,
        target_origin: Option<&str>,
    ) -> BrokerResult<Value> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }

        let request_id = self.next_request_id();
        let window = Duration::from_millis(self.config.request_timeout_ms);
        let (tx, mut rx) = oneshot::channel();
        self.pending.insert(
            request_id.clone(),
            PendingRequest {
                tx,
                deadline: Instant::now() + window,
                kind: kind.to_string(),
            },
        );
        metrics::set_pending_requests(self.pending.len());

        let envelope = Envelope::request(kind, &request_id, payload);
        let origin = target_origin.unwrap_or(&self.config.default_target_origin);
        if let Err(e) = target.post_message(envelope.to_value(), origin) {
            self.pending.remove(&request_id);
            metrics::set_pending_requests(self.pending.len());
            return Err(e);
        }
        tracing::debug!(request_id = %request_id, kind = kind, target_origin = origin, "Request posted");

        match timeout(window, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BrokerError::Closed),
            Err(_) => {
                if self.take(&request_id).is_some() {
                    tracing::warn!(request_id = %request_id, kind = kind, timeout_ms = self.config.request_timeout_ms, "Request timed out");
                    // One message per kind so repeats throttle together.
                    if let Some(report) = self.reporter.get() {
                        report(&format!("broker request {} timed out", kind));
                    }
                    Err(BrokerError::Timeout {
                        request_id,
                        timeout_ms: self.config.request_timeout_ms,
                    })
                } else {
                    // Settled concurrently with the deadline; take that outcome.
                    rx.await.unwrap_or(Err(BrokerError::Closed))
                }
            }
        }
    }

    /// Answer a request received from the other side.
    pub fn reply(
        &self,
        target: &dyn MessageTarget,
        request: &Envelope,
        result: Result<Value, String>,
        target_origin: &str,
    ) -> BrokerResult<()> {
        target.post_message(Envelope::reply_to(request, result).to_value(), target_origin)
    }

    /// Single entry point for every inbound message.
    ///
    /// The origin check runs before anything else; a rejected message gets
    /// no response and no side effect beyond a counter.
    pub fn handle_inbound(&self, message: &InboundMessage) -> InboundDisposition {
        if !self.policy.load().is_allowed(&message.origin) {
            metrics::record_message_dropped("origin");
            tracing::debug!(origin = %message.origin, "Dropping message from disallowed origin");
            return InboundDisposition::DroppedOrigin;
        }

        let Some(envelope) = Envelope::from_value(&message.data) else {
            metrics::record_message_dropped("malformed");
            tracing::debug!(origin = %message.origin, "Dropping message without a type");
            return InboundDisposition::Malformed;
        };

        if let Some(request_id) = envelope.request_id.as_deref() {
            if let Some(request) = self.take(request_id) {
                let outcome = match envelope.error {
                    Some(error) => Err(BrokerError::Remote(error)),
                    None => Ok(envelope.payload),
                };
                tracing::debug!(request_id = request_id, kind = %request.kind, "Response matched");
                let _ = request.tx.send(outcome);
                return InboundDisposition::Resolved;
            }
            if self.was_settled(request_id) {
                tracing::debug!(request_id = request_id, "Ignoring duplicate response");
                return InboundDisposition::Duplicate;
            }
        }

        let delivered = self.subscribers.emit(&envelope.kind, &envelope);
        InboundDisposition::Broadcast { delivered }
    }

    /// Subscribe to broadcast messages of type `kind`.
    pub fn on<F>(&self, kind: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribers.on(kind, callback)
    }

    /// Fire-and-forget event to the parent context. Returns false when there
    /// is no parent.
    pub fn broadcast_to_parent(&self, kind: &str, payload: Value) -> BrokerResult<bool> {
        let Some(parent) = &self.parent else {
            return Ok(false);
        };
        let origin = self
            .config
            .parent_origin
            .as_deref()
            .unwrap_or(&self.config.default_target_origin);
        parent.post_message(Envelope::event(kind, payload).to_value(), origin)?;
        Ok(true)
    }

    /// Reject every pending request whose deadline has passed. Returns how
    /// many were purged.
    pub fn recover(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut purged = 0;
        for request_id in expired {
            if let Some(request) = self.take(&request_id) {
                let _ = request.tx.send(Err(BrokerError::Timeout {
                    request_id: request_id.clone(),
                    timeout_ms: self.config.request_timeout_ms,
                }));
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::info!(purged = purged, "Purged expired broker requests");
        }
        purged
    }

    /// Reject all in-flight requests with `Closed` and refuse new ones.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for request_id in ids {
            if let Some(request) = self.take(&request_id) {
                let _ = request.tx.send(Err(BrokerError::Closed));
            }
        }
        self.subscribers.clear();
        tracing::debug!("Message broker closed");
    }
}

impl std::fmt::Debug for MessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBroker")
            .field("pending", &self.pending.len())
            .field("has_parent", &self.parent.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

//! Topic-keyed callback bus.
//!
//! `emit` snapshots the listener list before invoking anything, so callbacks
//! may subscribe or unsubscribe (including themselves) while an event is
//! being dispatched. A panicking callback is caught and logged; it never
//! unwinds into the emitter.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};

/// Callback invoked with each matching event.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listener<T> {
    id: u64,
    /// `None` listens to every topic.
    topic: Option<String>,
    callback: Callback<T>,
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            topic: self.topic.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

type ListenerList<T> = RwLock<Vec<Listener<T>>>;

/// Called with the topic whenever a listener panics.
pub type PanicHook = Box<dyn Fn(&str) + Send + Sync>;

/// Process-wide publish/subscribe bus.
pub struct EventBus<T> {
    listeners: Arc<ListenerList<T>>,
    next_id: AtomicU64,
    panics: AtomicU64,
    panic_hook: OnceLock<PanicHook>,
}

/// Handle returned by `on`; call `unsubscribe` to stop receiving events.
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    id: u64,
    remove: Box<dyn Fn(u64) -> bool + Send + Sync>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        (self.remove)(self.id)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<T: Send + Sync + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            panics: AtomicU64::new(0),
            panic_hook: OnceLock::new(),
        }
    }

    /// Install the panic hook. Only the first call takes effect.
    pub fn set_panic_hook<F>(&self, hook: F) -> bool
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.panic_hook.set(Box::new(hook)).is_ok()
    }

    /// Listen to a single topic.
    pub fn on<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(Some(topic.into()), Arc::new(callback))
    }

    /// Listen to every topic.
    pub fn on_any<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(None, Arc::new(callback))
    }

    fn add(&self, topic: Option<String>, callback: Callback<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(Listener { id, topic, callback });
        }

        let weak: Weak<ListenerList<T>> = Arc::downgrade(&self.listeners);
        Subscription {
            id,
            remove: Box::new(move |id| {
                let Some(listeners) = weak.upgrade() else {
                    return false;
                };
                let Ok(mut listeners) = listeners.write() else {
                    return false;
                };
                let before = listeners.len();
                listeners.retain(|l| l.id != id);
                listeners.len() != before
            }),
        }
    }

    /// Deliver `event` to every listener of `topic` and every catch-all
    /// listener. Returns the number of callbacks that completed.
    pub fn emit(&self, topic: &str, event: &T) -> usize {
        let snapshot: Vec<Listener<T>> = match self.listeners.read() {
            Ok(listeners) => listeners
                .iter()
                .filter(|l| l.topic.as_deref().map_or(true, |t| t == topic))
                .cloned()
                .collect(),
            Err(_) => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| (listener.callback)(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    self.panics.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(topic = topic, listener = listener.id, "Event listener panicked");
                    if let Some(hook) = self.panic_hook.get() {
                        hook(topic);
                    }
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Number of listener invocations that panicked.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    /// Drop every listener (teardown).
    pub fn clear(&self) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.clear();
        }
    }
}

impl<T: Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

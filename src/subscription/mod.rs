//! Subscription surface
//!
//! Listeners observe every queue mutation together with the post-mutation
//! active list. Registration returns a [`Subscription`] guard; dropping it, or
//! calling [`Subscription::unsubscribe`], guarantees the listener is not
//! running and will never run again once the call returns.

use flume::Receiver;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

use crate::queue::QueueUpdate;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Subscription whose listener is running on this thread, if any
    static DELIVERING: Cell<Option<u64>> = Cell::new(None);
}

/// Receives queue updates
///
/// Called on the queue's execution context; implementations must not block.
pub trait Listener: Send + Sync + 'static {
    fn on_update(&self, update: &QueueUpdate);
}

impl<F> Listener for F
where
    F: Fn(&QueueUpdate) + Send + Sync + 'static,
{
    fn on_update(&self, update: &QueueUpdate) {
        self(update)
    }
}

struct Entry {
    id: u64,
    listener: Box<dyn Listener>,
    alive: AtomicBool,
    /// Held for the duration of each delivery
    gate: Mutex<()>,
}

impl Entry {
    fn deliver(&self, update: &QueueUpdate) {
        let _gate = lock(&self.gate);
        if !self.alive.load(Ordering::Acquire) {
            return;
        }
        let previous = DELIVERING.with(|d| d.replace(Some(self.id)));
        self.listener.on_update(update);
        DELIVERING.with(|d| d.set(previous));
    }

    /// Stop future deliveries and wait out one in flight
    fn retire(&self) {
        self.alive.store(false, Ordering::Release);
        let reentrant = DELIVERING.with(|d| d.get() == Some(self.id));
        if !reentrant {
            drop(lock(&self.gate));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct RegistryState {
    entries: BTreeMap<u64, Arc<Entry>>,
    closed: bool,
}

/// Set of live listeners for one queue
#[derive(Default)]
pub struct SubscriberRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriberRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener
    ///
    /// After [`close`](Self::close) the returned subscription is inert.
    pub fn subscribe(self: &Arc<Self>, listener: impl Listener) -> Subscription {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let mut state = lock(&self.state);
        if state.closed {
            debug!("Subscription {} refused: registry closed", id);
            return Subscription {
                id,
                registry: Weak::new(),
                entry: None,
            };
        }

        let entry = Arc::new(Entry {
            id,
            listener: Box::new(listener),
            alive: AtomicBool::new(true),
            gate: Mutex::new(()),
        });
        state.entries.insert(id, entry.clone());
        debug!("Subscription {} registered ({} active)", id, state.entries.len());

        Subscription {
            id,
            registry: Arc::downgrade(self),
            entry: Some(entry),
        }
    }

    /// Register a listener that forwards every update into a channel
    pub fn subscribe_channel(self: &Arc<Self>) -> (Subscription, Receiver<QueueUpdate>) {
        let (tx, rx) = flume::unbounded();
        let subscription = self.subscribe(move |update: &QueueUpdate| {
            let _ = tx.send(update.clone());
        });
        (subscription, rx)
    }

    /// Deliver one update to every listener, in registration order
    pub fn publish(&self, update: &QueueUpdate) {
        let entries: Vec<Arc<Entry>> = {
            let state = lock(&self.state);
            if state.closed {
                return;
            }
            state.entries.values().cloned().collect()
        };

        for entry in entries {
            entry.deliver(update);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach every listener and refuse new ones
    ///
    /// Idempotent. When it returns no listener is running or will run again.
    pub fn close(&self) {
        let entries: Vec<Arc<Entry>> = {
            let mut state = lock(&self.state);
            state.closed = true;
            std::mem::take(&mut state.entries).into_values().collect()
        };

        for entry in entries {
            entry.retire();
        }
    }

    fn remove(&self, id: u64) {
        lock(&self.state).entries.remove(&id);
    }
}

/// Registration guard returned by [`SubscriberRegistry::subscribe`]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
    entry: Option<Arc<Entry>>,
}

impl Subscription {
    /// Stop receiving updates; safe to call more than once
    pub fn unsubscribe(&mut self) {
        if let Some(entry) = self.entry.take() {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.id);
            }
            entry.retire();
            debug!("Subscription {} released", self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.entry
            .as_ref()
            .map_or(false, |entry| entry.alive.load(Ordering::Acquire))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

//! # Event Bus
//!
//! Delivers [`SyncEvent`]s to the UI layer.
//!
//! Two ways to listen:
//! - `add_listener(callback)` returns a [`Subscription`]; dropping it or
//!   calling `unsubscribe()` removes the callback.
//! - `subscribe()` returns a broadcast receiver for tasks that `select!`.
//!
//! A panicking callback is logged and skipped; it never reaches the engine or
//! the other listeners.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error};

use tally_core::SyncEvent;

/// Capacity of the broadcast channel. Slow receivers see `Lagged`.
const BROADCAST_CAPACITY: usize = 64;

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: Mutex<BTreeMap<u64, Listener>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Listener>> {
        // Callbacks run outside the lock, so a poisoned map is still consistent.
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Observer registry plus broadcast channel.
pub struct EventBus {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    tx: broadcast::Sender<SyncEvent>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        EventBus {
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Registers a callback for every future event.
    pub fn add_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.lock().insert(id, Arc::new(callback));
        debug!(listener_id = id, "Listener added");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// A receiver of every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event to all listeners and receivers.
    pub fn notify(&self, event: &SyncEvent) {
        let listeners: Vec<(u64, Listener)> = self
            .registry
            .lock()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(listener_id = id, kind = ?event.kind, "Sync listener panicked");
            }
        }

        // No receivers is fine.
        let _ = self.tx.send(event.clone());
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().len()
    }
}

/// Handle that keeps a listener registered.
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    /// Keeps the listener registered for the bus's lifetime.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.id);
            debug!(listener_id = self.id, "Listener removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tally_core::SyncDirection;

    #[test]
    fn test_listener_receives_until_unsubscribed() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let sub = bus.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(&SyncEvent::success(SyncDirection::Push, 1));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        bus.notify(&SyncEvent::success(SyncDirection::Push, 1));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let _bad = bus.add_listener(|_| panic!("listener bug"));
        let counter = seen.clone();
        let _good = bus.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(&SyncEvent::failure(SyncDirection::Pull, "offline", true));
        bus.notify(&SyncEvent::success(SyncDirection::Pull, 0));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(bus.listener_count(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.notify(&SyncEvent::success(SyncDirection::Pull, 3));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.count, Some(3));
    }

    #[test]
    fn test_detached_listener_stays() {
        let bus = EventBus::new();
        bus.add_listener(|_| {}).detach();
        assert_eq!(bus.listener_count(), 1);
    }
}

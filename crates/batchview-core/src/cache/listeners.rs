// ── Cache change notification ──
//
// Explicit publish/subscribe registry. Listeners run synchronously on the
// mutating thread, in registration order, before the mutating call
// returns. The registry lock is never held while a listener runs, so
// listeners may read the cache or (un)subscribe freely.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::sync::lock;

/// A change applied to a [`DataCache`](super::DataCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// These keys were inserted or replaced (one event per batch).
    Updated(Vec<String>),
    /// This key was removed.
    Deleted(String),
    /// The cache was emptied.
    Cleared,
}

impl CacheEvent {
    /// Whether this event touches `key`. `Cleared` touches every key.
    pub fn affects(&self, key: &str) -> bool {
        match self {
            Self::Updated(keys) => keys.iter().any(|k| k == key),
            Self::Deleted(k) => k == key,
            Self::Cleared => true,
        }
    }
}

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Arc<ListenerList>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn subscribe(
        &self,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver `event` to every listener registered at call time.
    pub(crate) fn dispatch(&self, event: &CacheEvent) {
        let snapshot: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners).len()
    }
}

/// RAII registration of a cache listener. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Explicitly unsubscribe. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

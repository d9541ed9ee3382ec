// ── Poll service ──
//
// One timer per poll key. Several views may register for the same key
// (same params/options on the same cache); the timer only ticks the most
// recently registered live subscriber, so identical views never poll the
// backend twice per interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreError;

/// Work run on every poll tick.
pub type PollCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct PollEntry {
    subscribers: Vec<(u64, PollCallback)>,
    cancel: CancellationToken,
}

type PollEntries = DashMap<String, PollEntry>;

/// Per-cache registry of running polls.
pub struct PollService {
    next_id: AtomicU64,
    entries: Arc<PollEntries>,
}

impl Default for PollService {
    fn default() -> Self {
        Self::new()
    }
}

impl PollService {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Register `callback` under `key`, starting a timer if none runs yet.
    ///
    /// The first tick fires one `interval` after the timer starts. Fails when
    /// called outside a Tokio runtime.
    pub fn start_poll(
        &self,
        key: impl Into<String>,
        interval: Duration,
        callback: PollCallback,
    ) -> Result<PollHandle, CoreError> {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut spawn_timer = None;
        self.entries
            .entry(key.clone())
            .and_modify(|entry| entry.subscribers.push((id, Arc::clone(&callback))))
            .or_insert_with(|| {
                let cancel = CancellationToken::new();
                spawn_timer = Some(cancel.clone());
                PollEntry {
                    subscribers: vec![(id, Arc::clone(&callback))],
                    cancel,
                }
            });

        if let Some(cancel) = spawn_timer {
            let runtime = match tokio::runtime::Handle::try_current() {
                Ok(handle) => handle,
                Err(e) => {
                    self.entries.remove(&key);
                    return Err(CoreError::Runtime(e.to_string()));
                }
            };
            debug!(key, ?interval, "starting poll timer");
            runtime.spawn(poll_task(
                Arc::downgrade(&self.entries),
                key.clone(),
                interval,
                cancel,
            ));
        }

        Ok(PollHandle {
            registration: Arc::new(PollRegistration {
                key,
                id,
                entries: Arc::downgrade(&self.entries),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Number of keys with a running timer.
    pub fn active_polls(&self) -> usize {
        self.entries.len()
    }

    /// Number of live subscribers registered under `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, |e| e.subscribers.len())
    }
}

impl Drop for PollService {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            entry.cancel.cancel();
        }
    }
}

async fn poll_task(
    entries: Weak<PollEntries>,
    key: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // Resolve the callback, then release the map before awaiting it.
                let callback = entries.upgrade().and_then(|entries| {
                    entries
                        .get(&key)
                        .and_then(|e| e.subscribers.last().map(|(_, cb)| Arc::clone(cb)))
                });
                let Some(callback) = callback else {
                    debug!(key, "poll has no subscribers, exiting");
                    break;
                };
                debug!(key, "poll tick");
                callback().await;
            }
        }
    }
}

struct PollRegistration {
    key: String,
    id: u64,
    entries: Weak<PollEntries>,
    stopped: AtomicBool,
}

impl PollRegistration {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(entries) = self.entries.upgrade() else {
            return;
        };
        if let Some(mut entry) = entries.get_mut(&self.key) {
            entry.subscribers.retain(|(id, _)| *id != self.id);
        }
        if let Some((key, entry)) = entries.remove_if(&self.key, |_, e| e.subscribers.is_empty()) {
            entry.cancel.cancel();
            debug!(key, "stopped poll timer");
        }
    }
}

impl Drop for PollRegistration {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Keeps a poll subscription alive. Dropping it unsubscribes; the timer
/// stops once its last subscriber is gone.
pub struct PollHandle {
    registration: Arc<PollRegistration>,
}

impl PollHandle {
    pub fn key(&self) -> &str {
        &self.registration.key
    }

    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn stop(self) {
        self.registration.stop();
    }

    /// Stop handle that does not keep the poll alive.
    pub(crate) fn downgrade(&self) -> WeakPollHandle {
        WeakPollHandle(Arc::downgrade(&self.registration))
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("key", &self.registration.key)
            .finish()
    }
}

/// Lets a view stop a poll it started without owning it.
#[derive(Default)]
pub(crate) struct WeakPollHandle(Weak<PollRegistration>);

impl WeakPollHandle {
    pub(crate) fn stop(&self) {
        if let Some(registration) = self.0.upgrade() {
            registration.stop();
        }
    }
}

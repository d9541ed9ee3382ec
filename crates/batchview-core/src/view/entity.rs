use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::{ErrorFilter, SharedFetch, ViewSignals, replace_if_changed, resolved};
use crate::cache::{CacheEvent, DataCache, Subscription};
use crate::entity::{Entity, Params, fingerprint};
use crate::error::CoreError;
use crate::getter::EntityGetter;
use crate::options::FetchOptions;
use crate::poll::{PollHandle, WeakPollHandle};
use crate::status::{EntityViewState, LoadingStatus};
use crate::stream::ViewStream;
use crate::sync::lock;

/// Live view of one entity.
///
/// The `item` stream follows the cache: any write to the watched key
/// re-emits without a network call, and a deletion moves the view to
/// [`EntityViewState::Deleted`] and emits the key on `deleted`.
pub struct EntityView<P, T: Entity> {
    inner: Arc<EntityInner<P, T>>,
}

struct EntityInner<P, T: Entity> {
    getter: EntityGetter<P, T>,
    signals: ViewSignals,
    item: watch::Sender<Option<Arc<T>>>,
    state: watch::Sender<EntityViewState>,
    slot: Mutex<EntitySlot<P, T>>,
}

struct EntitySlot<P, T: Entity> {
    params: Option<P>,
    options: FetchOptions,
    target: Option<Target<T>>,
    in_flight: Option<(u64, SharedFetch<Arc<T>>)>,
    loaded_once: bool,
    poll: WeakPollHandle,
}

/// The cache entry a view currently watches.
struct Target<T: Entity> {
    key: String,
    cache: Arc<DataCache<T>>,
    _subscription: Subscription,
}

impl<P: Params, T: Entity> EntityView<P, T> {
    pub fn new(getter: EntityGetter<P, T>) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                getter,
                signals: ViewSignals::new(),
                item: watch::channel(None).0,
                state: watch::channel(EntityViewState::Empty).0,
                slot: Mutex::new(EntitySlot {
                    params: None,
                    options: FetchOptions::default(),
                    target: None,
                    in_flight: None,
                    loaded_once: false,
                    poll: WeakPollHandle::default(),
                }),
            }),
        }
    }

    #[must_use]
    pub fn with_params(self, params: P) -> Self {
        self.set_params(params);
        self
    }

    // ── Streams ─────────────────────────────────────────────────────

    pub fn item(&self) -> ViewStream<Option<Arc<T>>> {
        ViewStream::new(self.inner.item.subscribe())
    }

    pub fn state(&self) -> ViewStream<EntityViewState> {
        ViewStream::new(self.inner.state.subscribe())
    }

    pub fn status(&self) -> ViewStream<LoadingStatus> {
        self.inner.signals.status()
    }

    pub fn new_data_status(&self) -> ViewStream<LoadingStatus> {
        self.inner.signals.new_data_status()
    }

    pub fn error(&self) -> ViewStream<Option<CoreError>> {
        self.inner.signals.error()
    }

    /// Keys of the watched entity when it is deleted from the cache.
    pub fn deleted(&self) -> broadcast::Receiver<String> {
        self.inner.signals.deleted()
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn params(&self) -> Option<P> {
        lock(&self.inner.slot).params.clone()
    }

    /// Cache key the view currently watches.
    pub fn key(&self) -> Option<String> {
        lock(&self.inner.slot).target.as_ref().map(|t| t.key.clone())
    }

    pub fn current(&self) -> Option<Arc<T>> {
        self.inner.item.borrow().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.signals.is_disposed()
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Point the view at another entity.
    ///
    /// Nothing is fetched until [`fetch`](Self::fetch); the item shows the
    /// cached value for the new key (if any) right away. Responses to
    /// requests issued for the previous params are discarded.
    pub fn set_params(&self, params: P) {
        if self.is_disposed() {
            return;
        }
        let inner = &self.inner;
        let generation = inner.signals.bump_generation();
        let cache = inner.getter.cache(&params);
        let key = inner.getter.key(&params);
        let subscription = EntityInner::subscribe(&Arc::downgrade(inner), &cache);
        let cached = cache.get(&key);

        let previous = {
            let mut slot = lock(&inner.slot);
            slot.params = Some(params);
            slot.in_flight = None;
            slot.loaded_once = false;
            slot.target.replace(Target {
                key,
                cache,
                _subscription: subscription,
            })
        };
        drop(previous);

        debug!(generation, "entity view params changed");
        inner.signals.expect_new_data();
        inner.signals.reset_status();
        inner.state.send_if_modified(|s| replace_if_changed(s, EntityViewState::Empty));
        inner.set_item(cached);
    }

    /// Options used by later fetches (`cached`, `select`).
    pub fn set_fetch_options(&self, options: FetchOptions) {
        lock(&self.inner.slot).options = options;
    }

    pub fn set_error_filter(&self, filter: Option<ErrorFilter>) {
        self.inner.signals.set_error_filter(filter);
    }

    /// Fetch the entity.
    ///
    /// State and status change before this returns; a cached value is shown
    /// immediately. Calling again while a fetch for the same params is in
    /// flight returns that fetch instead of issuing another.
    pub fn fetch(&self) -> SharedFetch<Arc<T>> {
        self.inner.start_fetch()
    }

    /// Explicit user-triggered reload. Same contract as [`fetch`](Self::fetch).
    pub fn refresh(&self) -> SharedFetch<Arc<T>> {
        self.inner.start_fetch()
    }

    /// Re-fetch every `interval` (the getter's poll interval when `None`)
    /// while the returned handle lives.
    pub fn start_poll(&self, interval: Option<Duration>) -> Result<PollHandle, CoreError> {
        let interval = interval.unwrap_or_else(|| self.inner.getter.poll_interval());
        let (cache, key) = {
            let slot = lock(&self.inner.slot);
            let target = slot.target.as_ref().ok_or(CoreError::MissingParams)?;
            let params = slot.params.as_ref().ok_or(CoreError::MissingParams)?;
            (Arc::clone(&target.cache), format!("entity|{}", fingerprint(params)))
        };
        let weak = Arc::downgrade(&self.inner);
        let handle = cache.poll_service().start_poll(
            key,
            interval,
            Arc::new(move || {
                let weak = Weak::clone(&weak);
                async move {
                    if let Some(inner) = weak.upgrade() {
                        let _ = inner.start_fetch().await;
                    }
                }
                .boxed()
            }),
        )?;
        lock(&self.inner.slot).poll = handle.downgrade();
        Ok(handle)
    }

    /// Stop following the cache. Idempotent; no emission happens afterwards.
    pub fn dispose(&self) {
        if !self.inner.signals.dispose() {
            return;
        }
        let (target, poll) = {
            let mut slot = lock(&self.inner.slot);
            slot.in_flight = None;
            (slot.target.take(), std::mem::take(&mut slot.poll))
        };
        poll.stop();
        drop(target);
        debug!("entity view disposed");
    }
}

impl<P, T: Entity> Drop for EntityView<P, T> {
    fn drop(&mut self) {
        if self.inner.signals.dispose() {
            let poll = std::mem::take(&mut lock(&self.inner.slot).poll);
            poll.stop();
        }
    }
}

impl<P: Params, T: Entity> EntityInner<P, T> {
    fn subscribe(weak: &Weak<Self>, cache: &DataCache<T>) -> Subscription {
        let weak = Weak::clone(weak);
        cache.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_cache_event(event);
            }
        })
    }

    fn start_fetch(self: &Arc<Self>) -> SharedFetch<Arc<T>> {
        if self.signals.is_disposed() {
            return resolved(Err(CoreError::Disposed));
        }
        let generation = self.signals.generation();

        let (fetch, cached) = {
            let mut slot = lock(&self.slot);
            if let Some((issued, fetch)) = &slot.in_flight {
                if *issued == generation && fetch.peek().is_none() {
                    return fetch.clone();
                }
            }
            let (Some(params), Some(target)) = (slot.params.as_ref(), slot.target.as_ref()) else {
                return resolved(Err(CoreError::MissingParams));
            };
            let cached = target.cache.get(&target.key);
            let request = self.getter.fetch(params, &slot.options);

            let weak = Arc::downgrade(self);
            let fetch = async move {
                let result = request.await;
                match weak.upgrade() {
                    Some(inner) => inner.complete_fetch(generation, result),
                    None => result,
                }
            }
            .boxed()
            .shared();
            slot.in_flight = Some((generation, fetch.clone()));
            (fetch, cached)
        };

        self.state
            .send_if_modified(|s| replace_if_changed(s, EntityViewState::Fetching));
        self.signals.begin_loading();
        if cached.is_some() {
            self.set_item(cached);
        }
        fetch
    }

    fn complete_fetch(&self, generation: u64, result: Result<Arc<T>, CoreError>) -> Result<Arc<T>, CoreError> {
        if !self.signals.accepts(generation) {
            return result;
        }
        match &result {
            Ok(item) => {
                lock(&self.slot).loaded_once = true;
                self.set_item(Some(Arc::clone(item)));
                self.state
                    .send_if_modified(|s| replace_if_changed(s, EntityViewState::Ready));
                self.signals.finish_ok();
            }
            Err(err) => {
                let recorded = self.signals.finish_err(err);
                let next = if recorded {
                    EntityViewState::Error
                } else {
                    EntityViewState::Ready
                };
                self.state.send_if_modified(|s| replace_if_changed(s, next));

                // A previously loaded entity that now 404s was deleted remotely.
                let gone = {
                    let slot = lock(&self.slot);
                    match (&slot.target, slot.loaded_once && err.is_not_found()) {
                        (Some(target), true) => Some((Arc::clone(&target.cache), target.key.clone())),
                        _ => None,
                    }
                };
                if let Some((cache, key)) = gone {
                    debug!(key, "entity no longer exists, removing from cache");
                    if !cache.delete_item_by_key(&key) {
                        self.mark_deleted(&key);
                    }
                }
            }
        }
        result
    }

    fn on_cache_event(&self, event: &CacheEvent) {
        if self.signals.is_disposed() {
            return;
        }
        let (key, cache) = {
            let slot = lock(&self.slot);
            let Some(target) = slot.target.as_ref() else {
                return;
            };
            (target.key.clone(), Arc::clone(&target.cache))
        };
        if !event.affects(&key) {
            return;
        }
        match event {
            CacheEvent::Updated(_) => self.set_item(cache.get(&key)),
            CacheEvent::Deleted(_) => self.mark_deleted(&key),
            CacheEvent::Cleared => {
                self.set_item(None);
                self.state
                    .send_if_modified(|s| replace_if_changed(s, EntityViewState::Empty));
            }
        }
    }

    fn mark_deleted(&self, key: &str) {
        self.set_item(None);
        self.state
            .send_if_modified(|s| replace_if_changed(s, EntityViewState::Deleted));
        self.signals.emit_deleted(key);
    }

    fn set_item(&self, item: Option<Arc<T>>) {
        if self.signals.is_disposed() {
            return;
        }
        self.item.send_if_modified(|current| {
            let same = match (current.as_ref(), item.as_ref()) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b) || **a == **b,
                (None, None) => true,
                _ => false,
            };
            if !same {
                *current = item;
            }
            !same
        });
    }
}

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use indexmap::IndexSet;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::{ErrorFilter, SharedFetch, ViewSignals, replace_if_changed, resolved};
use crate::cache::{CacheEvent, DataCache, Subscription};
use crate::entity::{Entity, Params};
use crate::error::CoreError;
use crate::getter::{ListGetter, ListResponse};
use crate::options::{ContinuationToken, FilterMatcher, ListOptions};
use crate::poll::{PollHandle, WeakPollHandle};
use crate::status::{ListViewState, LoadingStatus};
use crate::stream::{ItemList, ViewStream};
use crate::sync::lock;

/// Live, paginated view of one collection slice.
///
/// The view only stores the ordered key sequence; `items` is materialized
/// from the cache on every emission, so cache writes and deletions made
/// anywhere show up without a network call.
///
/// Overlapping [`fetch_next`](Self::fetch_next) calls are serialized: a call
/// made while a page is in flight returns that same page request.
pub struct ListView<P, T: Entity> {
    inner: Arc<ListInner<P, T>>,
}

struct ListInner<P, T: Entity> {
    getter: ListGetter<P, T>,
    signals: ViewSignals,
    items: watch::Sender<ItemList<T>>,
    has_more: watch::Sender<bool>,
    state: watch::Sender<ListViewState>,
    matcher: Mutex<Option<FilterMatcher<T>>>,
    slot: Mutex<ListSlot<P, T>>,
}

struct ListSlot<P, T: Entity> {
    params: P,
    options: ListOptions,
    cache: Arc<DataCache<T>>,
    subscription: Option<Subscription>,
    keys: IndexSet<String>,
    /// Generation whose first page produced `keys`. A response for another
    /// generation replaces the sequence instead of extending it.
    keys_generation: Option<u64>,
    fixed_keys: IndexSet<String>,
    next_link: Option<ContinuationToken<P>>,
    has_more: bool,
    in_flight: Option<(u64, SharedFetch<()>)>,
    poll: WeakPollHandle,
}

impl<P: Params, T: Entity> ListView<P, T> {
    pub fn new(getter: ListGetter<P, T>, params: P, options: ListOptions) -> Self {
        let cache = getter.cache(&params);
        let inner = Arc::new(ListInner {
            getter,
            signals: ViewSignals::new(),
            items: watch::channel(Arc::new(Vec::new())).0,
            has_more: watch::channel(true).0,
            state: watch::channel(ListViewState::Empty).0,
            matcher: Mutex::new(None),
            slot: Mutex::new(ListSlot {
                params,
                options,
                cache: Arc::clone(&cache),
                subscription: None,
                keys: IndexSet::new(),
                keys_generation: None,
                fixed_keys: IndexSet::new(),
                next_link: None,
                has_more: true,
                in_flight: None,
                poll: WeakPollHandle::default(),
            }),
        });
        let subscription = ListInner::subscribe(&Arc::downgrade(&inner), &cache);
        lock(&inner.slot).subscription = Some(subscription);
        Self { inner }
    }

    /// Keep pinned keys consistent with the filter (see [`set_fixed_keys`](Self::set_fixed_keys)).
    #[must_use]
    pub fn with_filter_matcher(self, matcher: FilterMatcher<T>) -> Self {
        *lock(&self.inner.matcher) = Some(matcher);
        self
    }

    // ── Streams ─────────────────────────────────────────────────────

    pub fn items(&self) -> ViewStream<ItemList<T>> {
        ViewStream::new(self.inner.items.subscribe())
    }

    pub fn has_more(&self) -> ViewStream<bool> {
        ViewStream::new(self.inner.has_more.subscribe())
    }

    pub fn state(&self) -> ViewStream<ListViewState> {
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

    /// Keys removed from the list because they were deleted from the cache.
    pub fn deleted(&self) -> broadcast::Receiver<String> {
        self.inner.signals.deleted()
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn params(&self) -> P {
        lock(&self.inner.slot).params.clone()
    }

    pub fn options(&self) -> ListOptions {
        lock(&self.inner.slot).options.clone()
    }

    /// Current key sequence, without pinned keys.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.inner.slot).keys.iter().cloned().collect()
    }

    pub fn current(&self) -> ItemList<T> {
        Arc::clone(&self.inner.items.borrow())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.signals.is_disposed()
    }

    // ── Params and options ──────────────────────────────────────────

    /// Target another collection. Clears the list; nothing is fetched until
    /// [`fetch_next`](Self::fetch_next).
    pub fn set_params(&self, params: P) {
        if self.is_disposed() {
            return;
        }
        let inner = &self.inner;
        let cache = inner.getter.cache(&params);
        let resubscribe = lock(&inner.slot).cache.id() != cache.id();
        let subscription = resubscribe.then(|| ListInner::subscribe(&Arc::downgrade(inner), &cache));

        let previous = {
            let mut slot = lock(&inner.slot);
            slot.params = params;
            slot.cache = cache;
            subscription.and_then(|s| slot.subscription.replace(s))
        };
        drop(previous);

        inner.signals.expect_new_data();
        inner.reset(true);
    }

    /// Select another slice. Clears the list; nothing is fetched until
    /// [`fetch_next`](Self::fetch_next).
    pub fn set_options(&self, options: ListOptions) {
        if self.is_disposed() {
            return;
        }
        lock(&self.inner.slot).options = options;
        self.inner.reset(true);
    }

    /// Overlay `patch` on the current options, then behave like
    /// [`set_options`](Self::set_options).
    pub fn patch_options(&self, patch: &ListOptions) {
        let merged = lock(&self.inner.slot).options.merge(patch);
        self.set_options(merged);
    }

    /// Pin `keys` to the head of the list. With a filter matcher configured,
    /// pinned entities not matching the current filter are hidden.
    pub fn set_fixed_keys(&self, keys: impl IntoIterator<Item = String>) {
        lock(&self.inner.slot).fixed_keys = keys.into_iter().collect();
        self.inner.emit_items();
    }

    pub fn set_error_filter(&self, filter: Option<ErrorFilter>) {
        self.inner.signals.set_error_filter(filter);
    }

    // ── Fetching ────────────────────────────────────────────────────

    /// Fetch the next page (the first one after a reset).
    ///
    /// Resolves immediately when there is nothing more to load, including
    /// after an error, until params or options change. A remembered result
    /// for the same query is shown at once while the first page loads.
    pub fn fetch_next(&self) -> SharedFetch<()> {
        self.inner.start_fetch_next(false)
    }

    /// Drain every remaining page.
    pub async fn fetch_all(&self) -> Result<(), CoreError> {
        self.inner.fetch_all().await
    }

    /// Reload the first page, bypassing the query cache.
    ///
    /// With `clear` the list empties right away; otherwise current items
    /// stay visible until the new first page replaces them.
    pub fn refresh(&self, clear: bool) -> SharedFetch<()> {
        self.inner.refresh(clear)
    }

    /// [`refresh`](Self::refresh), then [`fetch_all`](Self::fetch_all).
    pub async fn refresh_all(&self, clear: bool) -> Result<(), CoreError> {
        self.inner.refresh_all(clear).await
    }

    /// Merge a newly created entity into the list once `created` resolves.
    ///
    /// An entity already listed keeps its position (its cached value is
    /// replaced); a new one is put at the head of the list and of the
    /// remembered query result.
    pub async fn load_new_item<F>(&self, created: F) -> Result<Arc<T>, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        let inner = &self.inner;
        let generation = inner.signals.generation();
        let item = created.await?;

        let (cache, query_key) = {
            let slot = lock(&inner.slot);
            (
                Arc::clone(&slot.cache),
                inner.getter.query_key(&slot.params, &slot.options),
            )
        };
        let (key, stored) = cache.upsert(item, None)?;
        if !inner.signals.accepts(generation) {
            return Ok(stored);
        }

        let inserted = {
            let mut slot = lock(&inner.slot);
            if slot.keys.contains(&key) {
                false
            } else {
                slot.keys.shift_insert(0, key.clone());
                true
            }
        };
        if inserted {
            cache.query_cache().add_key_to_query(&query_key, &key);
            debug!(key, "new item prepended to list");
            inner.emit_items();
        }
        Ok(stored)
    }

    /// Refresh every `interval` (the getter's poll interval when `None`)
    /// while the returned handle lives. With `all`, every page is reloaded.
    pub fn start_poll(&self, interval: Option<Duration>, all: bool) -> Result<PollHandle, CoreError> {
        let interval = interval.unwrap_or_else(|| self.inner.getter.poll_interval());
        let (cache, key) = {
            let slot = lock(&self.inner.slot);
            (
                Arc::clone(&slot.cache),
                format!("list|{}", self.inner.getter.query_key(&slot.params, &slot.options)),
            )
        };
        let weak = Arc::downgrade(&self.inner);
        let handle = cache.poll_service().start_poll(
            key,
            interval,
            Arc::new(move || {
                let weak = Weak::clone(&weak);
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let _ = if all {
                        inner.refresh_all(false).await
                    } else {
                        inner.refresh(false).await
                    };
                }
                .boxed()
            }),
        )?;
        lock(&self.inner.slot).poll = handle.downgrade();
        Ok(handle)
    }

    /// Stop following the cache. Idempotent; no emission happens afterwards.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl<P, T: Entity> Drop for ListView<P, T> {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl<P, T: Entity> ListInner<P, T> {
    fn dispose(&self) {
        if !self.signals.dispose() {
            return;
        }
        let (subscription, poll) = {
            let mut slot = lock(&self.slot);
            slot.in_flight = None;
            (slot.subscription.take(), std::mem::take(&mut slot.poll))
        };
        poll.stop();
        drop(subscription);
        debug!("list view disposed");
    }
}

impl<P: Params, T: Entity> ListInner<P, T> {
    fn subscribe(weak: &Weak<Self>, cache: &DataCache<T>) -> Subscription {
        let weak = Weak::clone(weak);
        cache.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_cache_event(event);
            }
        })
    }

    /// Forget pagination progress. Keys are kept when `clear` is false so
    /// the current items stay visible until replaced.
    fn reset(&self, clear: bool) {
        let generation = self.signals.bump_generation();
        {
            let mut slot = lock(&self.slot);
            if clear {
                slot.keys.clear();
            }
            slot.keys_generation = None;
            slot.next_link = None;
            slot.has_more = true;
            slot.in_flight = None;
        }
        debug!(generation, clear, "list view reset");
        self.signals.reset_status();
        self.has_more.send_if_modified(|v| replace_if_changed(v, true));
        if clear {
            self.state
                .send_if_modified(|s| replace_if_changed(s, ListViewState::Empty));
            self.emit_items();
        }
    }

    fn refresh(self: &Arc<Self>, clear: bool) -> SharedFetch<()> {
        if self.signals.is_disposed() {
            return resolved(Err(CoreError::Disposed));
        }
        self.reset(clear);
        self.start_fetch_next(true)
    }

    async fn refresh_all(self: &Arc<Self>, clear: bool) -> Result<(), CoreError> {
        self.refresh(clear).await?;
        self.fetch_all().await
    }

    async fn fetch_all(self: &Arc<Self>) -> Result<(), CoreError> {
        while self.more_to_load() {
            self.start_fetch_next(false).await?;
        }
        Ok(())
    }

    fn more_to_load(&self) -> bool {
        !self.signals.is_disposed() && lock(&self.slot).has_more
    }

    fn start_fetch_next(self: &Arc<Self>, force_new: bool) -> SharedFetch<()> {
        if self.signals.is_disposed() {
            return resolved(Err(CoreError::Disposed));
        }
        let generation = self.signals.generation();

        let (fetch, first_page, from_cache) = {
            let mut slot = lock(&self.slot);
            if let Some((issued, fetch)) = &slot.in_flight {
                if *issued == generation && fetch.peek().is_none() {
                    return fetch.clone();
                }
            }
            if !slot.has_more {
                return resolved(Ok(()));
            }

            let first_page = slot.keys_generation != Some(generation);
            let mut from_cache = false;
            let request = if first_page {
                if !force_new {
                    if let Some(hit) = self.getter.fetch_from_cache(&slot.params, &slot.options) {
                        debug!(items = hit.items.len(), "showing remembered list while loading");
                        slot.keys = hit.keys().into_iter().collect();
                        from_cache = true;
                    }
                }
                self.getter.fetch(&slot.params, &slot.options, true)
            } else {
                let Some(token) = slot.next_link.as_ref() else {
                    return resolved(Ok(()));
                };
                self.getter.fetch_next(token)
            };

            let weak = Arc::downgrade(self);
            let fetch = async move {
                let result = request.await;
                match weak.upgrade() {
                    Some(inner) => inner.complete_page(generation, result),
                    None => result.map(|_| ()),
                }
            }
            .boxed()
            .shared();
            slot.in_flight = Some((generation, fetch.clone()));
            (fetch, first_page, from_cache)
        };

        let state = if first_page {
            ListViewState::Loading
        } else {
            ListViewState::LoadingMore
        };
        self.state.send_if_modified(|s| replace_if_changed(s, state));
        self.signals.begin_loading();
        if from_cache {
            self.emit_items();
        }
        fetch
    }

    fn complete_page(
        &self,
        generation: u64,
        result: Result<ListResponse<T, P>, CoreError>,
    ) -> Result<(), CoreError> {
        if !self.signals.accepts(generation) {
            return result.map(|_| ());
        }
        match result {
            Ok(page) => {
                let keys = page.keys();
                let has_more = page.next_link.is_some();
                {
                    let mut slot = lock(&self.slot);
                    if slot.keys_generation == Some(generation) {
                        slot.keys.extend(keys);
                    } else {
                        slot.keys = keys.into_iter().collect();
                        slot.keys_generation = Some(generation);
                    }
                    slot.next_link = page.next_link;
                    slot.has_more = has_more;
                }
                self.has_more.send_if_modified(|v| replace_if_changed(v, has_more));
                self.emit_items();
                self.state
                    .send_if_modified(|s| replace_if_changed(s, ListViewState::Ready));
                self.signals.finish_ok();
                Ok(())
            }
            Err(err) => {
                {
                    let mut slot = lock(&self.slot);
                    slot.has_more = false;
                    slot.next_link = None;
                }
                self.has_more.send_if_modified(|v| replace_if_changed(v, false));
                let next = if self.signals.finish_err(&err) {
                    ListViewState::Error
                } else {
                    ListViewState::Ready
                };
                self.state.send_if_modified(|s| replace_if_changed(s, next));
                Err(err)
            }
        }
    }

    fn on_cache_event(&self, event: &CacheEvent) {
        if self.signals.is_disposed() {
            return;
        }
        match event {
            CacheEvent::Updated(keys) => {
                let listed = {
                    let slot = lock(&self.slot);
                    keys.iter()
                        .any(|k| slot.keys.contains(k) || slot.fixed_keys.contains(k))
                };
                if listed {
                    self.emit_items();
                }
            }
            CacheEvent::Deleted(key) => {
                let removed = {
                    let mut slot = lock(&self.slot);
                    let listed = slot.keys.shift_remove(key);
                    slot.fixed_keys.shift_remove(key) || listed
                };
                if removed {
                    self.emit_items();
                    self.signals.emit_deleted(key);
                }
            }
            CacheEvent::Cleared => {
                debug!("cache cleared, resetting list view");
                self.reset(true);
            }
        }
    }

    /// Re-materialize the key sequence from the cache and publish it if it
    /// changed.
    fn emit_items(&self) {
        if self.signals.is_disposed() {
            return;
        }
        let matcher = lock(&self.matcher).clone();
        let items = {
            let slot = lock(&self.slot);
            materialize(&slot, matcher.as_ref())
        };
        self.items.send_if_modified(|current| {
            let same = current.len() == items.len()
                && current.iter().zip(items.iter()).all(|(a, b)| Arc::ptr_eq(a, b));
            if !same {
                *current = items;
            }
            !same
        });
    }
}

fn materialize<P, T: Entity>(slot: &ListSlot<P, T>, matcher: Option<&FilterMatcher<T>>) -> ItemList<T> {
    let filter = slot.options.filter.as_deref().map(str::trim).filter(|f| !f.is_empty());
    let pinned = slot
        .fixed_keys
        .iter()
        .filter_map(|key| slot.cache.get(key))
        .filter(|item| match (matcher, filter) {
            (Some(matches), Some(filter)) => matches(item.as_ref(), filter),
            _ => true,
        });
    let listed = slot
        .keys
        .iter()
        .filter(|key| !slot.fixed_keys.contains(*key))
        .filter_map(|key| slot.cache.get(key));

    let mut items: Vec<Arc<T>> = pinned.chain(listed).collect();
    if let Some(max) = slot.options.max_items {
        items.truncate(max);
    }
    Arc::new(items)
}

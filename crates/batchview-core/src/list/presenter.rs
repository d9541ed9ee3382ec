// ── List data presenter ──
//
// Client-side sorting over a provider. Below the auto-update limit every
// change re-sorts. At or above it, with a sort key set, new data keeps the
// previous order (new items appended) until the source is complete, and
// the sort is flagged partial while more pages exist.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use indexmap::IndexMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::provider::ListDataProvider;
use super::sort::{ListSortConfig, SortDirection, SortingInfo, SortingStatus, stable_sort};
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::status::LoadingStatus;
use crate::stream::{ItemList, ViewStream};
use crate::sync::lock;
use crate::view::replace_if_changed;

pub struct ListDataPresenter<T: Entity> {
    inner: Arc<PresenterInner<T>>,
    cancel: CancellationToken,
}

struct PresenterInner<T: Entity> {
    provider: Arc<ListDataProvider<T>>,
    config: ListSortConfig<T>,
    limit: usize,
    items: watch::Sender<ItemList<T>>,
    sorting_status: watch::Sender<SortingStatus>,
    sorting_by: watch::Sender<SortingInfo>,
    state: Mutex<PresenterState<T>>,
    disposed: CancellationToken,
}

struct PresenterState<T> {
    sorted: ItemList<T>,
    sorting: SortingInfo,
    /// A full sort ran while the source had nothing more to load.
    sorted_complete: bool,
}

impl<T: Entity> ListDataPresenter<T> {
    /// Present `provider` sorted with `config`. Follows the provider from a
    /// background task, so a Tokio runtime is required.
    pub fn new(
        provider: Arc<ListDataProvider<T>>,
        config: ListSortConfig<T>,
        engine: &EngineConfig,
    ) -> Result<Self, CoreError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| CoreError::Runtime(e.to_string()))?;

        // Subscribe before the first update so no provider change falls
        // between it and the follower's first poll.
        let streams = ProviderStreams {
            items: provider.items(),
            status: provider.status(),
            has_more: provider.has_more(),
        };

        let cancel = CancellationToken::new();
        let inner = Arc::new(PresenterInner {
            provider,
            config,
            limit: engine.sort_auto_update_limit,
            items: watch::channel(Arc::new(Vec::new())).0,
            sorting_status: watch::channel(SortingStatus::Valid).0,
            sorting_by: watch::channel(SortingInfo::default()).0,
            state: Mutex::new(PresenterState {
                sorted: Arc::new(Vec::new()),
                sorting: SortingInfo::default(),
                sorted_complete: false,
            }),
            disposed: cancel.clone(),
        });
        inner.update(false);

        runtime.spawn(follow_provider(Arc::downgrade(&inner), streams, cancel.clone()));
        Ok(Self { inner, cancel })
    }

    pub fn items(&self) -> ViewStream<ItemList<T>> {
        ViewStream::new(self.inner.items.subscribe())
    }

    pub fn sorting_status(&self) -> ViewStream<SortingStatus> {
        ViewStream::new(self.inner.sorting_status.subscribe())
    }

    pub fn sorting_by(&self) -> ViewStream<SortingInfo> {
        ViewStream::new(self.inner.sorting_by.subscribe())
    }

    pub fn current(&self) -> ItemList<T> {
        Arc::clone(&self.inner.items.borrow())
    }

    pub fn provider(&self) -> &Arc<ListDataProvider<T>> {
        &self.inner.provider
    }

    /// Sort by `key` (`None`: source order). The direction stays as it was
    /// unless given. Always re-sorts, whatever the list size.
    pub fn sort_by(&self, key: Option<&str>, direction: Option<SortDirection>) -> Result<(), CoreError> {
        if let Some(key) = key {
            if !self.inner.config.contains(key) {
                return Err(CoreError::UnknownSortKey(key.to_owned()));
            }
        }
        let sorting = {
            let mut state = lock(&self.inner.state);
            state.sorting.key = key.map(str::to_owned);
            if let Some(direction) = direction {
                state.sorting.direction = direction;
            }
            state.sorting.clone()
        };
        debug!(key = ?sorting.key, direction = %sorting.direction, "sorting changed");
        self.inner.sorting_by.send_if_modified(|s| replace_if_changed(s, sorting));
        self.inner.update(true);
        Ok(())
    }

    /// Flip the direction by reversing the presented list.
    pub fn update_sort_direction(&self, direction: SortDirection) {
        if self.inner.disposed.is_cancelled() {
            return;
        }
        let (items, sorting) = {
            let mut state = lock(&self.inner.state);
            if state.sorting.direction == direction {
                return;
            }
            state.sorting.direction = direction;
            let mut reversed = state.sorted.to_vec();
            reversed.reverse();
            state.sorted = Arc::new(reversed);
            (Arc::clone(&state.sorted), state.sorting.clone())
        };
        self.inner.items.send_replace(items);
        self.inner.sorting_by.send_replace(sorting);
    }

    /// Recompute from the provider's current data.
    pub fn update(&self) {
        self.inner.update(false);
    }

    /// Load everything the provider can produce, then sort it all, which
    /// makes the order authoritative.
    pub async fn fetch_all_and_sort(&self) -> Result<(), CoreError> {
        self.inner.provider.fetch_all().await?;
        self.inner.update(true);
        Ok(())
    }

    /// Stop following the provider. No emission happens afterwards.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }
}

impl<T: Entity> Drop for ListDataPresenter<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ProviderStreams<T> {
    items: ViewStream<ItemList<T>>,
    status: ViewStream<LoadingStatus>,
    has_more: ViewStream<bool>,
}

async fn follow_provider<T: Entity>(
    inner: Weak<PresenterInner<T>>,
    streams: ProviderStreams<T>,
    cancel: CancellationToken,
) {
    let ProviderStreams {
        mut items,
        mut status,
        mut has_more,
    } = streams;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(_) = items.changed() => {}
            Some(_) = has_more.changed() => {}
            Some(_) = status.changed() => {}
            else => break,
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.update(false);
    }
    debug!("presenter stopped following provider");
}

impl<T: Entity> PresenterInner<T> {
    fn update(&self, force_resort: bool) {
        if self.disposed.is_cancelled() {
            return;
        }
        let snapshot = self.provider.snapshot();
        let complete = !snapshot.has_more;

        let (items, status) = {
            let mut state = lock(&self.state);
            let comparator = state
                .sorting
                .key
                .as_deref()
                .and_then(|key| self.config.get(key))
                .cloned();
            let large = comparator.is_some() && snapshot.items.len() >= self.limit;

            // Above the limit the order is computed once, then again only
            // when the source completes or a sort is requested.
            let resort = force_resort
                || !large
                || state.sorted.is_empty()
                || (complete && !state.sorted_complete);
            let sorted = if resort {
                let mut sorted = snapshot.items.to_vec();
                if let Some(compare) = &comparator {
                    stable_sort(&mut sorted, compare, state.sorting.direction);
                }
                state.sorted_complete = complete;
                sorted
            } else {
                debug!(items = snapshot.items.len(), "list above sort limit, keeping order");
                keep_order(&state.sorted, &snapshot.items)
            };
            if !complete {
                state.sorted_complete = false;
            }
            state.sorted = Arc::new(sorted);

            let partial = large && snapshot.has_more && snapshot.status != LoadingStatus::Loading;
            let status = if partial {
                SortingStatus::Partial
            } else {
                SortingStatus::Valid
            };
            (Arc::clone(&state.sorted), status)
        };

        self.items.send_replace(items);
        self.sorting_status
            .send_if_modified(|s| replace_if_changed(s, status));
    }
}

/// `current` in the order of `previous`, with entries not seen before
/// appended in source order.
fn keep_order<T: Entity>(previous: &[Arc<T>], current: &[Arc<T>]) -> Vec<Arc<T>> {
    let by_key: IndexMap<String, &Arc<T>> = current
        .iter()
        .map(|item| (item.cache_key(), item))
        .collect();
    let mut placed = HashSet::with_capacity(by_key.len());
    let mut ordered = Vec::with_capacity(by_key.len());

    for item in previous {
        let key = item.cache_key();
        if let Some(fresh) = by_key.get(&key) {
            ordered.push(Arc::clone(fresh));
            placed.insert(key);
        }
    }
    ordered.extend(
        by_key
            .iter()
            .filter(|(key, _)| !placed.contains(*key))
            .map(|(_, item)| Arc::clone(item)),
    );
    ordered
}

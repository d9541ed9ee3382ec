#![allow(clippy::unwrap_used)]
// List getter + list view against the in-memory pool service.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use batchview_core::{
    CoreError, DataCache, EngineConfig, ListGetter, ListOptions, ListView, ListViewState,
    LoadingStatus, TargetedDataCache,
};
use common::{Account, Backend, Pool, ids, list_getter, pool, pool_id, pool_json, within};

fn paged(size: u32) -> ListOptions {
    ListOptions::new().with_page_size(size)
}

fn setup(count: usize, options: ListOptions) -> (Arc<Backend>, Arc<DataCache<Pool>>, ListView<Account, Pool>) {
    let backend = Backend::with_pools(count);
    let cache = Arc::new(DataCache::new());
    let view = ListView::new(list_getter(&backend, &cache), Account::new("a"), options);
    (backend, cache, view)
}

// ── Pagination ──────────────────────────────────────────────────────

#[tokio::test]
async fn paginates_in_source_order_until_exhausted() {
    let (backend, _cache, view) = setup(25, paged(10));
    assert_eq!(*view.state().current(), ListViewState::Empty);
    assert!(*view.has_more().current());

    view.fetch_next().await.unwrap();
    assert_eq!(ids(&view.current()), (0..10).map(pool_id).collect::<Vec<_>>());
    assert!(*view.has_more().current());

    view.fetch_next().await.unwrap();
    view.fetch_next().await.unwrap();
    assert_eq!(ids(&view.current()), (0..25).map(pool_id).collect::<Vec<_>>());
    assert!(!*view.has_more().current());
    assert_eq!(*view.state().current(), ListViewState::Ready);
    assert_eq!(*view.status().current(), LoadingStatus::Ready);

    // Nothing more to load: resolves without a request.
    view.fetch_next().await.unwrap();
    assert_eq!(backend.page_calls(), 3);
}

#[tokio::test]
async fn overlapping_fetch_next_calls_share_one_page() {
    let (backend, _cache, view) = setup(25, paged(10));

    let first = view.fetch_next();
    let second = view.fetch_next();
    assert_eq!(*view.state().current(), ListViewState::Loading);
    let (a, b) = tokio::join!(first, second);
    a.unwrap();
    b.unwrap();

    assert_eq!(backend.page_calls(), 1);
    assert_eq!(view.current().len(), 10);

    let more = view.fetch_next();
    assert_eq!(*view.state().current(), ListViewState::LoadingMore);
    more.await.unwrap();
    assert_eq!(view.current().len(), 20);
}

#[tokio::test]
async fn fetch_all_drains_every_page() {
    let (backend, _cache, view) = setup(42, paged(10));
    view.fetch_all().await.unwrap();
    assert_eq!(view.current().len(), 42);
    assert_eq!(backend.page_calls(), 5);
}

#[tokio::test]
async fn remembered_query_is_shown_while_first_page_loads() {
    let (backend, cache, first) = setup(25, paged(10));
    first.fetch_all().await.unwrap();

    let second = ListView::new(list_getter(&backend, &cache), Account::new("a"), paged(10));
    let loading = second.fetch_next();
    assert_eq!(second.current().len(), 25);

    loading.await.unwrap();
    assert_eq!(second.current().len(), 10);
    assert!(*second.has_more().current());
    assert_eq!(backend.page_calls(), 4);
}

#[tokio::test]
async fn max_items_truncates_the_list() {
    let (_backend, _cache, view) = setup(25, paged(10).with_max_items(15));
    view.fetch_all().await.unwrap();
    assert_eq!(view.current().len(), 15);
    assert_eq!(view.keys().len(), 25);
}

// ── Refresh ─────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_without_clear_keeps_items_until_replaced() {
    let (backend, _cache, view) = setup(25, paged(10));
    view.fetch_next().await.unwrap();
    view.fetch_next().await.unwrap();
    backend.insert_front(pool_json(100));

    let refreshing = view.refresh(false);
    assert_eq!(view.current().len(), 20);
    assert_eq!(view.current()[0].id, pool_id(0));

    refreshing.await.unwrap();
    assert_eq!(view.current().len(), 10);
    assert_eq!(view.current()[0].id, pool_id(100));
    assert!(*view.has_more().current());
}

#[tokio::test]
async fn refresh_with_clear_empties_immediately() {
    let (_backend, _cache, view) = setup(25, paged(10));
    view.fetch_next().await.unwrap();

    let refreshing = view.refresh(true);
    assert!(view.current().is_empty());
    assert_eq!(*view.state().current(), ListViewState::Loading);

    refreshing.await.unwrap();
    assert_eq!(view.current().len(), 10);
}

// ── New items ───────────────────────────────────────────────────────

#[tokio::test]
async fn new_items_are_prepended_once() {
    let (backend, cache, view) = setup(5, paged(10));
    view.fetch_next().await.unwrap();

    let created = view.load_new_item(async { Ok(pool(100)) }).await.unwrap();
    assert_eq!(created.id, pool_id(100));
    assert_eq!(view.current()[0].id, pool_id(100));
    assert_eq!(view.current().len(), 6);

    // Same entity again: no duplicate.
    view.load_new_item(async { Ok(pool(100)) }).await.unwrap();
    assert_eq!(view.current().len(), 6);

    // Already listed: keeps its position, takes the new value.
    let mut resized = pool(3);
    resized.target_nodes = 99;
    view.load_new_item(async move { Ok(resized) }).await.unwrap();
    let items = view.current();
    assert_eq!(items.len(), 6);
    assert_eq!(items[4].id, pool_id(3));
    assert_eq!(items[4].target_nodes, 99);

    let getter = list_getter(&backend, &cache);
    let remembered = cache
        .query_cache()
        .get_keys(&getter.query_key(&Account::new("a"), &paged(10)))
        .unwrap();
    assert_eq!(remembered.keys.first(), Some(&pool_id(100)));
    assert_eq!(remembered.keys.len(), 6);
}

#[tokio::test]
async fn failed_creation_leaves_the_list_alone() {
    let (_backend, _cache, view) = setup(5, paged(10));
    view.fetch_next().await.unwrap();

    let result = view
        .load_new_item(async { Err(CoreError::server(409, "pool exists")) })
        .await;

    assert!(result.unwrap_err().is_conflict());
    assert_eq!(view.current().len(), 5);
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn error_stops_pagination_until_refresh() {
    let (backend, _cache, view) = setup(25, paged(10));
    view.fetch_next().await.unwrap();

    backend.fail_with(Some(CoreError::Transport("connection reset".into())));
    assert!(view.fetch_next().await.is_err());
    assert!(!*view.has_more().current());
    assert_eq!(*view.state().current(), ListViewState::Error);
    assert_eq!(*view.status().current(), LoadingStatus::Error);
    assert!(view.error().current().is_some());
    assert_eq!(view.current().len(), 10);

    backend.fail_with(None);
    let calls = backend.page_calls();
    view.fetch_next().await.unwrap();
    assert_eq!(backend.page_calls(), calls);

    view.refresh(false).await.unwrap();
    assert_eq!(*view.state().current(), ListViewState::Ready);
    assert!(view.error().current().is_none());
    assert!(*view.has_more().current());
}

// ── Params, options, filters ────────────────────────────────────────

#[tokio::test]
async fn changing_params_discards_the_in_flight_page() {
    let (_backend, _cache, view) = setup(25, paged(10));

    let stale = view.fetch_next();
    view.set_params(Account::new("b"));
    stale.await.unwrap();

    assert!(view.current().is_empty());
    assert_eq!(*view.state().current(), ListViewState::Empty);
    assert_eq!(*view.new_data_status().current(), LoadingStatus::Loading);

    view.fetch_next().await.unwrap();
    assert_eq!(view.params(), Account::new("b"));
    assert_eq!(view.current().len(), 10);
    assert_eq!(*view.new_data_status().current(), LoadingStatus::Ready);
}

#[tokio::test]
async fn patching_options_restarts_the_list() {
    let (backend, _cache, view) = setup(12, paged(10));
    backend.update(&pool_id(4), "state", json!("resizing"));
    view.fetch_all().await.unwrap();
    assert_eq!(view.current().len(), 12);

    view.patch_options(&ListOptions::new().with_filter("state=resizing"));
    assert!(view.current().is_empty());
    assert_eq!(view.options().page_size, Some(10));

    view.fetch_next().await.unwrap();
    assert_eq!(ids(&view.current()), vec![pool_id(4)]);
}

#[tokio::test]
async fn pinned_items_lead_and_follow_the_filter() {
    let (backend, cache, view) = setup(10, paged(20).with_filter("state=active"));
    let view = view.with_filter_matcher(Arc::new(|pool: &Pool, filter: &str| {
        filter
            .split_once('=')
            .is_some_and(|(_, state)| pool.state == state)
    }));
    backend.update(&pool_id(3), "state", json!("resizing"));
    cache.put(pool(50));
    let mut resizing = pool(3);
    resizing.state = "resizing".into();
    cache.put(resizing);

    view.set_fixed_keys([pool_id(50), pool_id(3)]);
    view.fetch_next().await.unwrap();

    let listed = ids(&view.current());
    assert_eq!(listed[0], pool_id(50));
    assert!(!listed.contains(&pool_id(3)));
    assert_eq!(listed.len(), 10);
}

#[tokio::test]
async fn scoped_caches_keep_lists_apart() {
    let caches = Arc::new(TargetedDataCache::<Account, Pool>::new(|account: &Account| {
        account.name.clone()
    }));
    let small = Backend::with_pools(3);
    let large = Backend::with_pools(8);
    let view_a = ListView::new(
        ListGetter::new(Arc::clone(&caches), small.page_source()),
        Account::new("a"),
        paged(10),
    );
    let view_b = ListView::new(
        ListGetter::new(Arc::clone(&caches), large.page_source()),
        Account::new("b"),
        paged(10),
    );
    view_a.fetch_next().await.unwrap();
    view_b.fetch_next().await.unwrap();

    let mut renamed = pool(0);
    renamed.vm_size = "standard_m64".into();
    caches.get_cache_by_scope("a").put(renamed);
    assert_eq!(view_a.current()[0].vm_size, "standard_m64");
    assert_eq!(view_b.current()[0].vm_size, "standard_d2");

    caches.get_cache_by_scope("a").clear();
    assert!(view_a.current().is_empty());
    assert_eq!(*view_a.state().current(), ListViewState::Empty);
    assert_eq!(view_b.current().len(), 8);
}

// ── Cache events ────────────────────────────────────────────────────

#[tokio::test]
async fn deleted_items_leave_the_list_and_the_query_cache() {
    let (backend, cache, view) = setup(5, paged(10));
    view.fetch_next().await.unwrap();
    let mut deleted = view.deleted();

    cache.delete_item_by_key(&pool_id(1));

    assert_eq!(deleted.try_recv().unwrap(), pool_id(1));
    assert_eq!(view.keys().len(), 4);
    let getter = list_getter(&backend, &cache);
    let remembered = cache
        .query_cache()
        .get_keys(&getter.query_key(&Account::new("a"), &paged(10)))
        .unwrap();
    assert!(!remembered.keys.contains(&pool_id(1)));
}

#[tokio::test]
async fn updates_elsewhere_show_up_in_the_list() {
    let (_backend, cache, view) = setup(5, paged(10));
    view.fetch_next().await.unwrap();
    let mut items = view.items();

    let mut updated = pool(2);
    updated.target_nodes = 64;
    cache.put(updated);

    let seen = within(items.changed()).await.unwrap();
    assert_eq!(seen[2].target_nodes, 64);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polling_refreshes_the_first_page() {
    let (backend, cache, view) = setup(5, paged(10));
    view.fetch_next().await.unwrap();

    let handle = view.start_poll(Some(Duration::from_secs(10)), false).unwrap();
    backend.insert_front(pool_json(100));
    tokio::time::sleep(Duration::from_secs(15)).await;

    assert_eq!(backend.page_calls(), 2);
    assert_eq!(view.current()[0].id, pool_id(100));

    drop(handle);
    view.dispose();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.page_calls(), 2);
    assert_eq!(cache.poll_service().active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn polling_defaults_to_the_configured_interval() {
    let backend = Backend::with_pools(5);
    let cache = Arc::new(DataCache::new());
    let engine = EngineConfig {
        poll_interval_secs: 30,
        ..EngineConfig::default()
    };
    let view = ListView::new(
        list_getter(&backend, &cache).with_config(&engine),
        Account::new("a"),
        paged(10),
    );
    view.fetch_next().await.unwrap();

    let _handle = view.start_poll(None, false).unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(backend.page_calls(), 1);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(backend.page_calls(), 2);
}

#[tokio::test]
async fn disposed_view_stops_listening() {
    let (_backend, cache, view) = setup(5, paged(10));
    view.fetch_next().await.unwrap();
    assert_eq!(cache.listener_count(), 1);

    view.dispose();
    assert_eq!(cache.listener_count(), 0);
    assert!(matches!(view.fetch_next().await, Err(CoreError::Disposed)));
}

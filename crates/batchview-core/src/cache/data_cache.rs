// ── Entity cache ──
//
// Concurrent key -> entity storage with synchronous change notification
// through the listener registry, a `broadcast` feed of deletions, and a
// `watch` version counter for async consumers.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::trace;
use uuid::Uuid;

use super::listeners::{CacheEvent, ListenerRegistry, Subscription};
use super::query_cache::QueryCache;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::poll::PollService;

const DELETED_CHANNEL_SIZE: usize = 256;

/// Read-through cache for one entity type.
///
/// Created once per resource type (or per scope, see
/// [`TargetedDataCache`](super::TargetedDataCache)) and shared by every
/// getter and view on that type. Entries live until explicitly deleted or
/// the cache is cleared.
pub struct DataCache<T: Entity> {
    id: Uuid,
    items: DashMap<String, Arc<T>>,
    query_cache: QueryCache,
    poll_service: PollService,
    listeners: ListenerRegistry,
    deleted: broadcast::Sender<String>,
    version: watch::Sender<u64>,
}

impl<T: Entity> Default for DataCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> DataCache<T> {
    pub fn new() -> Self {
        Self::with_query_ttl(None)
    }

    /// Create a cache whose query-cache entries expire after `ttl`.
    pub fn with_query_ttl(ttl: Option<Duration>) -> Self {
        let (deleted, _) = broadcast::channel(DELETED_CHANNEL_SIZE);
        let (version, _) = watch::channel(0u64);
        Self {
            id: Uuid::new_v4(),
            items: DashMap::new(),
            query_cache: QueryCache::with_ttl(ttl),
            poll_service: PollService::new(),
            listeners: ListenerRegistry::new(),
            deleted,
            version,
        }
    }

    /// Unique id of this cache instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.query_cache
    }

    pub fn poll_service(&self) -> &PollService {
        &self.poll_service
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// The entity stored under `key` at the time of the call.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.items.get(key).map(|r| Arc::clone(r.value()))
    }

    pub fn has(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.iter().map(|r| r.key().clone()).collect()
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Insert or replace `item`. Returns its key.
    ///
    /// Writing a value equal to the cached one is a no-op and notifies nobody.
    pub fn put(&self, item: T) -> String {
        let key = item.cache_key();
        let item = Arc::new(item);
        if self.store(&key, &item) {
            self.notify(&CacheEvent::Updated(vec![key.clone()]));
        }
        key
    }

    /// Like [`put`](Self::put), but when `select` lists attributes only those
    /// are overwritten on an already cached entity.
    pub fn put_selected(&self, item: T, select: Option<&str>) -> Result<String, CoreError> {
        self.upsert(item, select).map(|(key, _)| key)
    }

    /// Insert or replace a batch. One notification covers the whole batch.
    pub fn put_all(&self, items: Vec<T>) -> Vec<String> {
        let mut keys = Vec::with_capacity(items.len());
        let mut changed = Vec::new();
        for item in items {
            let key = item.cache_key();
            if self.store(&key, &Arc::new(item)) {
                changed.push(key.clone());
            }
            keys.push(key);
        }
        if !changed.is_empty() {
            self.notify(&CacheEvent::Updated(changed));
        }
        keys
    }

    /// Batched [`put_selected`](Self::put_selected).
    pub fn put_all_selected(
        &self,
        items: Vec<T>,
        select: Option<&str>,
    ) -> Result<Vec<String>, CoreError> {
        self.upsert_all(items, select)
            .map(|stored| stored.into_iter().map(|(key, _)| key).collect())
    }

    pub(crate) fn upsert(&self, item: T, select: Option<&str>) -> Result<(String, Arc<T>), CoreError> {
        let key = item.cache_key();
        let item = Arc::new(self.compute_new_item(item, &key, select)?);
        if self.store(&key, &item) {
            self.notify(&CacheEvent::Updated(vec![key.clone()]));
        }
        Ok((key, item))
    }

    pub(crate) fn upsert_all(
        &self,
        items: Vec<T>,
        select: Option<&str>,
    ) -> Result<Vec<(String, Arc<T>)>, CoreError> {
        let mut stored = Vec::with_capacity(items.len());
        let mut changed = Vec::new();
        for item in items {
            let key = item.cache_key();
            let item = Arc::new(self.compute_new_item(item, &key, select)?);
            if self.store(&key, &item) {
                changed.push(key.clone());
            }
            stored.push((key, item));
        }
        if !changed.is_empty() {
            self.notify(&CacheEvent::Updated(changed));
        }
        Ok(stored)
    }

    /// Delete `item` (by its key). Returns `true` if it was cached.
    pub fn delete_item(&self, item: &T) -> bool {
        self.delete_item_by_key(&item.cache_key())
    }

    /// Delete the entity under `key` and drop it from every query-cache entry.
    /// Returns `true` if it was cached.
    pub fn delete_item_by_key(&self, key: &str) -> bool {
        self.query_cache.delete_item_key(key);
        if self.items.remove(key).is_none() {
            return false;
        }
        let _ = self.deleted.send(key.to_owned());
        self.notify(&CacheEvent::Deleted(key.to_owned()));
        true
    }

    /// Remove every entity and query-cache entry.
    pub fn clear(&self) {
        self.query_cache.clear();
        self.items.clear();
        self.notify(&CacheEvent::Cleared);
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Register a synchronous listener. Dropping the returned handle
    /// unsubscribes.
    pub fn subscribe(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Feed of deleted keys.
    pub fn deleted(&self) -> broadcast::Receiver<String> {
        self.deleted.subscribe()
    }

    /// Counter bumped after every effective mutation.
    pub fn version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Store `item` under `key`. Returns `false` when the value is unchanged.
    fn store(&self, key: &str, item: &Arc<T>) -> bool {
        if let Some(existing) = self.items.get(key) {
            if **existing.value() == **item {
                return false;
            }
        }
        self.items.insert(key.to_owned(), Arc::clone(item));
        true
    }

    fn notify(&self, event: &CacheEvent) {
        self.version.send_modify(|v| *v += 1);
        trace!(cache = %self.id, ?event, "cache changed");
        self.listeners.dispatch(event);
    }

    /// Merge only the selected attributes of `item` over the cached entity.
    fn compute_new_item(&self, item: T, key: &str, select: Option<&str>) -> Result<T, CoreError> {
        let Some(select) = select.filter(|s| !s.trim().is_empty()) else {
            return Ok(item);
        };
        let Some(existing) = self.get(key) else {
            return Ok(item);
        };

        let invalid = |reason: &str| CoreError::InvalidSelect {
            select: select.to_owned(),
            reason: reason.to_owned(),
        };
        let mut merged = serde_json::to_value(&*existing).map_err(|e| invalid(&e.to_string()))?;
        let update = serde_json::to_value(&item).map_err(|e| invalid(&e.to_string()))?;
        let (Value::Object(base), Value::Object(changes)) = (&mut merged, &update) else {
            return Err(invalid("entity does not serialize to an object"));
        };
        for attribute in select.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            if let Some(value) = changes.get(attribute) {
                base.insert(attribute.to_owned(), value.clone());
            }
        }
        serde_json::from_value(merged.clone()).map_err(|e| CoreError::deserialization(&e, &merged))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pool {
        id: String,
        state: String,
        #[serde(default)]
        vm_size: Option<String>,
    }

    impl Entity for Pool {
        fn cache_key(&self) -> String {
            self.id.clone()
        }
    }

    fn pool(id: &str, state: &str) -> Pool {
        Pool {
            id: id.into(),
            state: state.into(),
            vm_size: Some("standard_d2".into()),
        }
    }

    fn recorder(cache: &DataCache<Pool>) -> (Arc<Mutex<Vec<CacheEvent>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let sub = cache.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        (events, sub)
    }

    #[test]
    fn put_then_get_returns_equal_value() {
        let cache = DataCache::new();
        let key = cache.put(pool("p1", "active"));
        assert_eq!(key, "p1");
        assert_eq!(*cache.get("p1").unwrap(), pool("p1", "active"));
    }

    #[test]
    fn delete_removes_item_and_notifies() {
        let cache = DataCache::new();
        let (events, _sub) = recorder(&cache);
        cache.put(pool("p1", "active"));

        assert!(cache.delete_item_by_key("p1"));
        assert!(cache.get("p1").is_none());
        assert!(!cache.delete_item_by_key("p1"));
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                CacheEvent::Updated(vec!["p1".into()]),
                CacheEvent::Deleted("p1".into()),
            ]
        );
    }

    #[test]
    fn delete_propagates_to_query_cache() {
        let cache = DataCache::new();
        let keys = cache.put_all(vec![pool("a", "x"), pool("b", "x")]);
        cache
            .query_cache()
            .set_keys("all", keys.into_iter().collect(), None);

        cache.delete_item_by_key("a");

        let entry = cache.query_cache().get_keys("all").unwrap();
        assert_eq!(entry.keys.iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn put_all_sends_one_notification() {
        let cache = DataCache::new();
        let (events, _sub) = recorder(&cache);
        cache.put_all(vec![pool("a", "x"), pool("b", "x"), pool("c", "x")]);

        assert_eq!(
            *events.lock().unwrap(),
            vec![CacheEvent::Updated(vec!["a".into(), "b".into(), "c".into()])]
        );
    }

    #[test]
    fn unchanged_put_is_silent() {
        let cache = DataCache::new();
        cache.put(pool("a", "x"));
        let (events, _sub) = recorder(&cache);
        let version = *cache.version().borrow();

        cache.put(pool("a", "x"));

        assert!(events.lock().unwrap().is_empty());
        assert_eq!(*cache.version().borrow(), version);
    }

    #[test]
    fn put_selected_only_overwrites_selected_attributes() {
        let cache = DataCache::new();
        cache.put(pool("p1", "active"));

        let partial = Pool {
            id: "p1".into(),
            state: "resizing".into(),
            vm_size: None,
        };
        cache.put_selected(partial, Some("id, state")).unwrap();

        let stored = cache.get("p1").unwrap();
        assert_eq!(stored.state, "resizing");
        assert_eq!(stored.vm_size.as_deref(), Some("standard_d2"));
    }

    #[test]
    fn put_selected_without_cached_entity_stores_item_as_is() {
        let cache = DataCache::new();
        let partial = Pool {
            id: "p1".into(),
            state: "resizing".into(),
            vm_size: None,
        };
        cache.put_selected(partial.clone(), Some("state")).unwrap();
        assert_eq!(*cache.get("p1").unwrap(), partial);
    }

    #[test]
    fn clear_empties_items_and_queries() {
        let cache = DataCache::new();
        let (events, _sub) = recorder(&cache);
        cache.put(pool("a", "x"));
        cache.query_cache().set_keys("q", ["a".to_owned()].into_iter().collect(), None);

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.query_cache().is_empty());
        assert_eq!(events.lock().unwrap().last(), Some(&CacheEvent::Cleared));
    }

    #[tokio::test]
    async fn deleted_feed_carries_keys() {
        let cache = DataCache::new();
        let mut deleted = cache.deleted();
        cache.put(pool("a", "x"));
        cache.delete_item(&pool("a", "x"));
        assert_eq!(deleted.recv().await.unwrap(), "a");
    }
}

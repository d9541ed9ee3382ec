use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::DataCache;
use crate::entity::{Entity, KeyFn};

/// A family of independent [`DataCache`]s, one per scope.
///
/// Used where one entity type lives under a parent resource (files of a
/// node, files of a task): the scope key is derived from the params, and
/// each scope gets its own cache, so clearing or deleting in one scope
/// never touches another.
pub struct TargetedDataCache<P, T: Entity> {
    id: Uuid,
    scope_key: KeyFn<P>,
    caches: DashMap<String, Arc<DataCache<T>>>,
    query_ttl: Option<Duration>,
}

impl<P, T: Entity> TargetedDataCache<P, T> {
    pub fn new(scope_key: impl Fn(&P) -> String + Send + Sync + 'static) -> Self {
        Self::with_query_ttl(scope_key, None)
    }

    pub fn with_query_ttl(
        scope_key: impl Fn(&P) -> String + Send + Sync + 'static,
        query_ttl: Option<Duration>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope_key: Arc::new(scope_key),
            caches: DashMap::new(),
            query_ttl,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Scope key for `params`.
    pub fn scope_of(&self, params: &P) -> String {
        (self.scope_key)(params)
    }

    /// The cache for the scope `params` belong to, created on first use.
    pub fn get_cache(&self, params: &P) -> Arc<DataCache<T>> {
        self.get_cache_by_scope(&self.scope_of(params))
    }

    pub fn get_cache_by_scope(&self, scope: &str) -> Arc<DataCache<T>> {
        if let Some(cache) = self.caches.get(scope) {
            return Arc::clone(cache.value());
        }
        let cache = self
            .caches
            .entry(scope.to_owned())
            .or_insert_with(|| {
                debug!(scope, "creating scoped cache");
                Arc::new(DataCache::with_query_ttl(self.query_ttl))
            });
        Arc::clone(cache.value())
    }

    /// Scopes that currently have a cache.
    pub fn scopes(&self) -> Vec<String> {
        self.caches.iter().map(|r| r.key().clone()).collect()
    }

    /// Clear every scope's cache. Views keep their subscriptions.
    pub fn clear_all(&self) {
        let caches: Vec<_> = self.caches.iter().map(|r| Arc::clone(r.value())).collect();
        for cache in caches {
            cache.clear();
        }
    }
}

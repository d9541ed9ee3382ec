// ── Cache registry ──
//
// Application-level owner of cache lifecycle. Every cache created through
// the registry (or registered with it) can be cleared in one call, e.g.
// when the user switches account.

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info};
use uuid::Uuid;

use super::{DataCache, TargetedDataCache};
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::sync::lock;

/// A cache the registry can clear.
pub trait ClearableCache: Send + Sync {
    fn cache_id(&self) -> Uuid;

    /// Drop every cached entity (and query-cache entry).
    fn clear_cache(&self);
}

impl<T: Entity> ClearableCache for DataCache<T> {
    fn cache_id(&self) -> Uuid {
        self.id()
    }

    fn clear_cache(&self) {
        self.clear();
    }
}

impl<P: Send + Sync, T: Entity> ClearableCache for TargetedDataCache<P, T> {
    fn cache_id(&self) -> Uuid {
        self.id()
    }

    fn clear_cache(&self) {
        self.clear_all();
    }
}

/// Explicitly constructed replacement for a process-wide cache tracker.
///
/// Created once at startup and handed to whatever builds getters and views.
/// Holds weak handles only: a cache dropped by its owner simply disappears
/// from the registry.
pub struct CacheRegistry {
    config: EngineConfig,
    caches: Mutex<Vec<Weak<dyn ClearableCache>>>,
}

impl CacheRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            caches: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a [`DataCache`] configured from the engine settings and track it.
    pub fn data_cache<T: Entity>(&self) -> Arc<DataCache<T>> {
        let cache = Arc::new(DataCache::with_query_ttl(self.config.query_cache_ttl()));
        self.register(&cache);
        cache
    }

    /// Create a [`TargetedDataCache`] configured from the engine settings and track it.
    pub fn targeted_cache<P, T>(
        &self,
        scope_key: impl Fn(&P) -> String + Send + Sync + 'static,
    ) -> Arc<TargetedDataCache<P, T>>
    where
        P: Send + Sync + 'static,
        T: Entity,
    {
        let cache = Arc::new(TargetedDataCache::with_query_ttl(
            scope_key,
            self.config.query_cache_ttl(),
        ));
        self.register(&cache);
        cache
    }

    /// Track a cache created elsewhere.
    pub fn register<C: ClearableCache + 'static>(&self, cache: &Arc<C>) {
        let weak = Arc::downgrade(cache);
        let weak: Weak<dyn ClearableCache> = weak;
        lock(&self.caches).push(weak);
        debug!(cache = %cache.cache_id(), "registered cache");
    }

    /// Number of live tracked caches.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear every live cache whose id is not in `except`.
    pub fn clear_all(&self, except: &[Uuid]) {
        let caches = self.live();
        let mut cleared = 0usize;
        for cache in caches {
            if except.contains(&cache.cache_id()) {
                continue;
            }
            cache.clear_cache();
            cleared += 1;
        }
        info!(cleared, kept = except.len(), "cleared caches");
    }

    /// Clear everything and stop tracking. Used on shutdown.
    pub fn dispose_all(&self) {
        self.clear_all(&[]);
        lock(&self.caches).clear();
    }

    /// Prune dead handles and return strong references to the rest.
    ///
    /// The list lock is released before any cache is touched, so clearing
    /// (which notifies views) never runs under it.
    fn live(&self) -> Vec<Arc<dyn ClearableCache>> {
        let mut caches = lock(&self.caches);
        caches.retain(|c| c.strong_count() > 0);
        caches.iter().filter_map(Weak::upgrade).collect()
    }
}

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::debug;

use super::{BoxFetch, CacheSource, EntitySource, Transform, json_transform, log_fetch_error};
use crate::cache::DataCache;
use crate::config::EngineConfig;
use crate::entity::{Entity, KeyFn};
use crate::error::{CoreError, status_code};
use crate::options::FetchOptions;

/// Fetches single entities and writes them through the cache.
pub struct EntityGetter<P, T: Entity> {
    cache: CacheSource<P, T>,
    key: KeyFn<P>,
    source: Arc<dyn EntitySource<P>>,
    transform: Transform<T>,
    ignored_error_codes: Arc<[u16]>,
    poll_interval: Duration,
}

impl<P, T: Entity> Clone for EntityGetter<P, T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: Arc::clone(&self.key),
            source: Arc::clone(&self.source),
            transform: Arc::clone(&self.transform),
            ignored_error_codes: Arc::clone(&self.ignored_error_codes),
            poll_interval: self.poll_interval,
        }
    }
}

impl<P: Clone + Send + Sync + 'static, T: Entity> EntityGetter<P, T> {
    /// `key` maps params to the cache key of the entity they address. It
    /// must agree with [`Entity::cache_key`] of the fetched entity.
    pub fn new(
        cache: impl Into<CacheSource<P, T>>,
        key: impl Fn(&P) -> String + Send + Sync + 'static,
        source: impl EntitySource<P>,
    ) -> Self {
        Self {
            cache: cache.into(),
            key: Arc::new(key),
            source: Arc::new(source),
            transform: json_transform(),
            ignored_error_codes: Arc::from([status_code::NOT_FOUND]),
            poll_interval: EngineConfig::default().poll_interval(),
        }
    }

    /// Replace the default serde transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform<T>) -> Self {
        self.transform = transform;
        self
    }

    /// Statuses that are expected and only logged at debug level.
    #[must_use]
    pub fn with_ignored_error_codes(mut self, codes: impl Into<Arc<[u16]>>) -> Self {
        self.ignored_error_codes = codes.into();
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.poll_interval = config.poll_interval();
        self.with_ignored_error_codes(config.ignored_error_codes.clone())
    }

    /// Interval views poll at when none is given.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn cache(&self, params: &P) -> Arc<DataCache<T>> {
        self.cache.resolve(params)
    }

    pub fn key(&self, params: &P) -> String {
        (self.key)(params)
    }

    pub fn ignored_error_codes(&self) -> &[u16] {
        &self.ignored_error_codes
    }

    /// Fetch the entity `params` address.
    ///
    /// With `options.cached` a cache hit is returned without calling the
    /// source. Otherwise the source is called, the result transformed and
    /// written to the cache. Nothing is written on error.
    pub fn fetch(&self, params: &P, options: &FetchOptions) -> BoxFetch<Arc<T>> {
        let cache = self.cache(params);
        let key = self.key(params);

        if options.cached {
            if let Some(item) = cache.get(&key) {
                debug!(key, "entity served from cache");
                return futures_util::future::ready(Ok(item)).boxed();
            }
        }

        let request = self.source.fetch(params, options);
        let transform = Arc::clone(&self.transform);
        let ignored = Arc::clone(&self.ignored_error_codes);
        let select = options.select.clone();

        async move {
            let result = async move {
                let raw = request.await?;
                let item = transform(raw)?;
                let (_, stored) = cache.upsert(item, select.as_deref())?;
                Ok::<_, CoreError>(stored)
            }
            .await;
            if let Err(err) = &result {
                log_fetch_error(err, &ignored, &key);
            } else {
                debug!(key, "entity fetched");
            }
            result
        }
        .boxed()
    }
}

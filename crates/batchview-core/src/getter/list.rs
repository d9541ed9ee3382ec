use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use indexmap::IndexSet;
use tracing::debug;

use super::{BoxFetch, CacheSource, PageSource, Transform, json_transform, log_fetch_error};
use crate::cache::DataCache;
use crate::config::EngineConfig;
use crate::entity::{Entity, Params, fingerprint};
use crate::error::{CoreError, status_code};
use crate::options::{ContinuationToken, ListOptions};

/// One page of typed entities plus where to resume.
#[derive(Debug)]
pub struct ListResponse<T, P> {
    pub items: Vec<Arc<T>>,
    pub next_link: Option<ContinuationToken<P>>,
}

impl<T, P: Clone> Clone for ListResponse<T, P> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            next_link: self.next_link.clone(),
        }
    }
}

impl<T: Entity, P> ListResponse<T, P> {
    pub fn keys(&self) -> Vec<String> {
        self.items.iter().map(|item| item.cache_key()).collect()
    }

    pub fn has_more(&self) -> bool {
        self.next_link.is_some()
    }
}

/// Fetches pages of a collection and records them in the cache and its
/// query cache. Page order is exactly the order the source returns.
pub struct ListGetter<P, T: Entity> {
    cache: CacheSource<P, T>,
    source: Arc<dyn PageSource<P>>,
    transform: Transform<T>,
    ignored_error_codes: Arc<[u16]>,
    page_size: Option<u32>,
    poll_interval: Duration,
}

impl<P, T: Entity> Clone for ListGetter<P, T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            source: Arc::clone(&self.source),
            transform: Arc::clone(&self.transform),
            ignored_error_codes: Arc::clone(&self.ignored_error_codes),
            page_size: self.page_size,
            poll_interval: self.poll_interval,
        }
    }
}

impl<P: Params, T: Entity> ListGetter<P, T> {
    pub fn new(cache: impl Into<CacheSource<P, T>>, source: impl PageSource<P>) -> Self {
        Self {
            cache: cache.into(),
            source: Arc::new(source),
            transform: json_transform(),
            ignored_error_codes: Arc::from([status_code::NOT_FOUND]),
            page_size: None,
            poll_interval: EngineConfig::default().poll_interval(),
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform<T>) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn with_ignored_error_codes(mut self, codes: impl Into<Arc<[u16]>>) -> Self {
        self.ignored_error_codes = codes.into();
        self
    }

    /// Apply engine-wide defaults (ignored codes, page size, poll interval).
    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.page_size = config.page_size;
        self.poll_interval = config.poll_interval();
        self.with_ignored_error_codes(config.ignored_error_codes.clone())
    }

    pub fn cache(&self, params: &P) -> Arc<DataCache<T>> {
        self.cache.resolve(params)
    }

    pub fn ignored_error_codes(&self) -> &[u16] {
        &self.ignored_error_codes
    }

    /// Interval views poll at when none is given.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Query-cache key of `params` + `options`.
    pub fn query_key(&self, params: &P, options: &ListOptions) -> String {
        format!("{}|{}", fingerprint(params), options.cache_key())
    }

    /// Answer the first page from the query cache, if every remembered key
    /// is still cached.
    pub fn fetch_from_cache(&self, params: &P, options: &ListOptions) -> Option<ListResponse<T, P>> {
        let cache = self.cache(params);
        let entry = cache.query_cache().get_keys(&self.query_key(params, options))?;
        let items = entry
            .keys
            .iter()
            .map(|key| cache.get(key))
            .collect::<Option<Vec<_>>>()?;
        let next_link = entry.next_link.map(|next_link| ContinuationToken {
            params: params.clone(),
            options: options.clone(),
            next_link,
        });
        Some(ListResponse { items, next_link })
    }

    /// Fetch the first page.
    ///
    /// Unless `force_new` is set a query-cache hit is answered without
    /// calling the source. A fetched first page replaces the remembered key
    /// set for this query.
    pub fn fetch(&self, params: &P, options: &ListOptions, force_new: bool) -> BoxFetch<ListResponse<T, P>> {
        if !force_new {
            if let Some(cached) = self.fetch_from_cache(params, options) {
                debug!(items = cached.items.len(), "list served from query cache");
                return futures_util::future::ready(Ok(cached)).boxed();
            }
        }
        self.fetch_page(params.clone(), self.effective_options(options), None)
    }

    /// Fetch the page a continuation token points to. Its keys are appended
    /// to the remembered key set.
    pub fn fetch_next(&self, token: &ContinuationToken<P>) -> BoxFetch<ListResponse<T, P>> {
        self.fetch_page(
            token.params.clone(),
            token.options.clone(),
            Some(token.next_link.clone()),
        )
    }

    /// Drain every page, concatenated in order.
    pub async fn fetch_all(&self, params: &P, options: &ListOptions) -> Result<Vec<Arc<T>>, CoreError> {
        let mut page = self.fetch(params, options, true).await?;
        let mut items = std::mem::take(&mut page.items);
        while let Some(token) = page.next_link.take() {
            page = self.fetch_next(&token).await?;
            items.append(&mut page.items);
        }
        debug!(items = items.len(), "fetched all pages");
        Ok(items)
    }

    fn effective_options(&self, options: &ListOptions) -> ListOptions {
        let mut options = options.clone();
        if options.page_size.is_none() {
            options.page_size = self.page_size;
        }
        options
    }

    fn fetch_page(
        &self,
        params: P,
        options: ListOptions,
        next_link: Option<String>,
    ) -> BoxFetch<ListResponse<T, P>> {
        let cache = self.cache(&params);
        let query_key = self.query_key(&params, &options);
        let request = self.source.fetch_page(&params, &options, next_link.as_deref());
        let transform = Arc::clone(&self.transform);
        let ignored = Arc::clone(&self.ignored_error_codes);
        let first_page = next_link.is_none();

        async move {
            let result = async move {
                let page = request.await?;
                // Transform the whole page before touching the cache.
                let entities = page
                    .items
                    .into_iter()
                    .map(transform.as_ref())
                    .collect::<Result<Vec<T>, CoreError>>()?;
                let stored = cache.upsert_all(entities, options.select.as_deref())?;

                let keys: IndexSet<String> = stored.iter().map(|(key, _)| key.clone()).collect();
                if first_page {
                    cache.query_cache().set_keys(query_key.clone(), keys, page.next_link.clone());
                } else {
                    cache.query_cache().append_keys(query_key.clone(), keys, page.next_link.clone());
                }
                debug!(
                    query_key,
                    items = stored.len(),
                    has_more = page.next_link.is_some(),
                    "fetched page"
                );

                Ok::<_, CoreError>(ListResponse {
                    items: stored.into_iter().map(|(_, item)| item).collect(),
                    next_link: page.next_link.map(|next_link| ContinuationToken {
                        params,
                        options,
                        next_link,
                    }),
                })
            }
            .await;
            if let Err(err) = &result {
                log_fetch_error(err, &ignored, "list page");
            }
            result
        }
        .boxed()
    }
}

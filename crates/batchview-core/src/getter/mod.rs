// ── Getters ──
//
// Turn an injected fetch function into typed, cached results. Getters are
// stateless apart from their cache handle; views add state on top.

mod entity;
mod list;

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{DataCache, TargetedDataCache};
use crate::entity::Entity;
use crate::error::CoreError;
use crate::options::{FetchOptions, ListOptions};

pub use entity::EntityGetter;
pub use list::{ListGetter, ListResponse};

/// Boxed `'static` future produced by sources and getters.
pub type BoxFetch<R> = BoxFuture<'static, Result<R, CoreError>>;

/// One raw page as returned by a list fetch function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPage {
    pub items: Vec<Value>,
    /// Opaque link to the next page; `None` on the last page.
    #[serde(default)]
    pub next_link: Option<String>,
}

impl RawPage {
    pub fn new(items: Vec<Value>, next_link: Option<String>) -> Self {
        Self { items, next_link }
    }
}

/// Fetches the raw JSON of one entity.
///
/// Implemented for any `Fn(P, FetchOptions) -> impl Future<Output =
/// Result<Value, CoreError>>`, so a closure over an HTTP client is enough.
pub trait EntitySource<P>: Send + Sync + 'static {
    fn fetch(&self, params: &P, options: &FetchOptions) -> BoxFetch<Value>;
}

impl<P, F, Fut> EntitySource<P> for F
where
    P: Clone,
    F: Fn(P, FetchOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
{
    fn fetch(&self, params: &P, options: &FetchOptions) -> BoxFetch<Value> {
        self(params.clone(), options.clone()).boxed()
    }
}

/// Fetches one raw page of a collection.
///
/// `next_link` is `None` for the first page and the previous page's link
/// afterwards.
pub trait PageSource<P>: Send + Sync + 'static {
    fn fetch_page(&self, params: &P, options: &ListOptions, next_link: Option<&str>) -> BoxFetch<RawPage>;
}

impl<P, F, Fut> PageSource<P> for F
where
    P: Clone,
    F: Fn(P, ListOptions, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RawPage, CoreError>> + Send + 'static,
{
    fn fetch_page(&self, params: &P, options: &ListOptions, next_link: Option<&str>) -> BoxFetch<RawPage> {
        self(params.clone(), options.clone(), next_link.map(str::to_owned)).boxed()
    }
}

/// Builds an entity from its raw JSON.
pub type Transform<T> = Arc<dyn Fn(Value) -> Result<T, CoreError> + Send + Sync>;

/// Plain serde deserialization.
pub fn json_transform<T: Entity>() -> Transform<T> {
    Arc::new(|raw: Value| {
        serde_json::from_value::<T>(raw.clone()).map_err(|e| CoreError::deserialization(&e, &raw))
    })
}

/// The cache a getter writes into: one shared cache, or one per scope.
pub enum CacheSource<P, T: Entity> {
    Shared(Arc<DataCache<T>>),
    Targeted(Arc<TargetedDataCache<P, T>>),
}

impl<P, T: Entity> CacheSource<P, T> {
    /// The cache that holds entities for `params`.
    pub fn resolve(&self, params: &P) -> Arc<DataCache<T>> {
        match self {
            Self::Shared(cache) => Arc::clone(cache),
            Self::Targeted(caches) => caches.get_cache(params),
        }
    }
}

impl<P, T: Entity> Clone for CacheSource<P, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Shared(cache) => Self::Shared(Arc::clone(cache)),
            Self::Targeted(caches) => Self::Targeted(Arc::clone(caches)),
        }
    }
}

impl<P, T: Entity> From<Arc<DataCache<T>>> for CacheSource<P, T> {
    fn from(cache: Arc<DataCache<T>>) -> Self {
        Self::Shared(cache)
    }
}

impl<P, T: Entity> From<Arc<TargetedDataCache<P, T>>> for CacheSource<P, T> {
    fn from(caches: Arc<TargetedDataCache<P, T>>) -> Self {
        Self::Targeted(caches)
    }
}

/// Log a fetch failure at a level matching whether it was expected.
pub(crate) fn log_fetch_error(err: &CoreError, ignored_codes: &[u16], what: &str) {
    if err.is_ignored(ignored_codes) {
        tracing::debug!(error = %err, what, "fetch failed with expected status");
    } else {
        tracing::warn!(error = %err, what, "fetch failed");
    }
}

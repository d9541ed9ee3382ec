// ── Fetch and list options ──

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::fingerprint;

/// Options for a single-entity fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Serve from the cache when the entity is already there.
    #[serde(default)]
    pub cached: bool,
    /// Comma-separated attributes to request; only those are merged into
    /// an already cached entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
}

impl FetchOptions {
    /// Options that allow a cache hit to skip the network.
    pub fn cached() -> Self {
        Self {
            cached: true,
            select: None,
        }
    }

    #[must_use]
    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }
}

/// Options for a list query.
///
/// `filter`, `select`, `orderby`, and extra `attributes` identify which
/// slice of a collection is listed and take part in the query-cache key.
/// `page_size` and `max_items` only shape how it is fetched and shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// Upper bound on the number of items a list view shows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    #[must_use]
    pub fn with_orderby(mut self, orderby: impl Into<String>) -> Self {
        self.orderby = Some(orderby.into());
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Overlay `patch` on these options: fields set in `patch` win,
    /// attributes are merged.
    #[must_use]
    pub fn merge(&self, patch: &ListOptions) -> ListOptions {
        let mut attributes = self.attributes.clone();
        attributes.extend(patch.attributes.clone());
        ListOptions {
            filter: patch.filter.clone().or_else(|| self.filter.clone()),
            select: patch.select.clone().or_else(|| self.select.clone()),
            orderby: patch.orderby.clone().or_else(|| self.orderby.clone()),
            page_size: patch.page_size.or(self.page_size),
            max_items: patch.max_items.or(self.max_items),
            attributes,
        }
    }

    /// Stable key of the slice these options select. Pagination and display
    /// limits are excluded, so the same filter always maps to the same
    /// query-cache entry.
    pub fn cache_key(&self) -> String {
        #[derive(Serialize)]
        struct Slice<'a> {
            filter: Option<&'a str>,
            select: Option<&'a str>,
            orderby: Option<&'a str>,
            attributes: &'a BTreeMap<String, String>,
        }
        fingerprint(&Slice {
            filter: self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()),
            select: self.select.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            orderby: self.orderby.as_deref().map(str::trim).filter(|o| !o.is_empty()),
            attributes: &self.attributes,
        })
    }
}

/// Where to resume a paginated list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationToken<P> {
    pub params: P,
    pub options: ListOptions,
    pub next_link: String,
}

/// Decides whether an entity matches a list filter expression.
///
/// Used to keep pinned (fixed) keys consistent with the current filter.
pub type FilterMatcher<T> = Arc<dyn Fn(&T, &str) -> bool + Send + Sync>;

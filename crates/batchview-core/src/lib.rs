//! Client-side entity cache and paginated view engine for batch resource
//! consoles.
//!
//! - **[`DataCache`]**: Key/value store of immutable entity snapshots
//!   (`DashMap` + synchronous listeners). Every write notifies subscribed
//!   views, so one fetch updates every screen showing that entity. A
//!   [`QueryCache`] remembers which keys each list query returned.
//!
//! - **[`TargetedDataCache`]**: One [`DataCache`] per parent scope (e.g.
//!   files per pool/node), created lazily.
//!
//! - **[`EntityGetter`] / [`ListGetter`]**: Stateless fetch adapters that
//!   call a user-supplied source, transform raw JSON into entities, and
//!   write the result into the cache.
//!
//! - **[`EntityView`] / [`ListView`]**: Stateful reactive projections for
//!   one consumer: status, error, items, pagination, polling, deletion
//!   tracking. Responses to superseded params are discarded.
//!
//! - **[`ListDataProvider`] / [`ListDataPresenter`]**: Normalize any item
//!   source into streams, then sort client-side with a size threshold above
//!   which new data does not reorder the list.
//!
//! - **[`PollService`]**: Keyed periodic refresh shared between views.

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod getter;
pub mod list;
pub mod options;
pub mod poll;
pub mod status;
pub mod stream;
pub mod view;

mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{
    CacheEvent, CacheRegistry, CachedKeyList, ClearableCache, DataCache, QueryCache, Subscription,
    TargetedDataCache,
};
pub use config::EngineConfig;
pub use entity::{Entity, KeyFn, Params, composite_key};
pub use error::CoreError;
pub use getter::{
    BoxFetch, CacheSource, EntityGetter, EntitySource, ListGetter, ListResponse, PageSource,
    RawPage, Transform, json_transform,
};
pub use list::{
    DataSource, ListDataPresenter, ListDataProvider, ListSortConfig, LiveList, ProviderSnapshot,
    SortDirection, SortingInfo, SortingStatus,
};
pub use options::{ContinuationToken, FetchOptions, FilterMatcher, ListOptions};
pub use poll::{PollHandle, PollService};
pub use status::{EntityViewState, ListViewState, LoadingStatus};
pub use stream::{ItemList, ViewStream};
pub use view::{EntityView, ErrorFilter, ListView, SharedFetch};

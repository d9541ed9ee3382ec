// ── Engine configuration ──
//
// Tunables shared by caches, getters, views, and the presenter. Built by
// the caller (usually from `batchview-config`) and handed to the
// `CacheRegistry` at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, status_code};

/// Item count at which the presenter stops re-sorting on every update.
pub const DEFAULT_SORT_AUTO_UPDATE_LIMIT: usize = 20_000;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Runtime settings for the cache/list/view engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lists at or above this size are not automatically re-sorted.
    pub sort_auto_update_limit: usize,

    /// Error statuses that are expected and logged at debug level only.
    pub ignored_error_codes: Vec<u16>,

    /// Lifetime of a query-cache entry. `None` keeps entries until cleared.
    pub query_cache_ttl_secs: Option<u64>,

    /// Default interval for view polling.
    pub poll_interval_secs: u64,

    /// Page size requested from the backend when the caller sets none.
    pub page_size: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sort_auto_update_limit: DEFAULT_SORT_AUTO_UPDATE_LIMIT,
            ignored_error_codes: vec![status_code::NOT_FOUND],
            query_cache_ttl_secs: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            page_size: None,
        }
    }
}

impl EngineConfig {
    pub fn query_cache_ttl(&self) -> Option<Duration> {
        self.query_cache_ttl_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sort_auto_update_limit == 0 {
            return Err(CoreError::Config(
                "sort_auto_update_limit must be greater than zero".into(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(CoreError::Config(
                "poll_interval_secs must be greater than zero".into(),
            ));
        }
        if self.page_size == Some(0) {
            return Err(CoreError::Config("page_size must be greater than zero".into()));
        }
        Ok(())
    }
}

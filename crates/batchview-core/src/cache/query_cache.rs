// ── Query cache ──
//
// Remembers which ordered key set a list query (params + filter/select/
// orderby) produced, so a list can be shown again without waiting for the
// network. The continuation link is stored alongside; an entry without one
// is complete.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexSet;
use tracing::debug;

/// The ordered key set last produced by one list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKeyList {
    pub keys: IndexSet<String>,
    /// Link to the next page, `None` once every page has been seen.
    pub next_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CachedKeyList {
    /// Whether every page of the query has been fetched.
    pub fn is_complete(&self) -> bool {
        self.next_link.is_none()
    }
}

/// Per-cache index of query key to ordered entity keys.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<String, CachedKeyList>,
    ttl: Option<Duration>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `ttl` are treated as absent.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Replace the key set stored for `query_key`.
    pub fn set_keys(
        &self,
        query_key: impl Into<String>,
        keys: IndexSet<String>,
        next_link: Option<String>,
    ) {
        self.entries.insert(
            query_key.into(),
            CachedKeyList {
                keys,
                next_link,
                created_at: Utc::now(),
            },
        );
    }

    /// Append a further page to the key set stored for `query_key`.
    pub fn append_keys(
        &self,
        query_key: impl Into<String>,
        keys: impl IntoIterator<Item = String>,
        next_link: Option<String>,
    ) {
        let mut entry = self
            .entries
            .entry(query_key.into())
            .or_insert_with(|| CachedKeyList {
                keys: IndexSet::new(),
                next_link: None,
                created_at: Utc::now(),
            });
        entry.keys.extend(keys);
        entry.next_link = next_link;
    }

    /// Key set stored for `query_key`, unless missing or expired.
    pub fn get_keys(&self, query_key: &str) -> Option<CachedKeyList> {
        let entry = self.entries.get(query_key)?.value().clone();
        if self.is_expired(&entry) {
            self.entries.remove(query_key);
            debug!(query_key, "query cache entry expired");
            return None;
        }
        Some(entry)
    }

    /// Put `key` at the head of an existing entry (newly created entities).
    pub fn add_key_to_query(&self, query_key: &str, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(query_key) {
            if entry.keys.contains(key) {
                return;
            }
            let mut keys = IndexSet::with_capacity(entry.keys.len() + 1);
            keys.insert(key.to_owned());
            keys.extend(entry.keys.drain(..));
            entry.keys = keys;
        }
    }

    /// Remove `key` from every stored entry.
    pub fn delete_item_key(&self, key: &str) {
        for mut entry in self.entries.iter_mut() {
            entry.keys.shift_remove(key);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CachedKeyList) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let age = Utc::now().signed_duration_since(entry.created_at);
        age.to_std().is_ok_and(|age| age >= ttl)
    }
}

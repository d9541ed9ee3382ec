// ── Entity and params contracts ──
//
// Entities are immutable value snapshots identified by a string key.
// Params identify *which* entity or collection a getter/view targets.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A record that can live in a [`DataCache`](crate::DataCache).
///
/// Entities are never mutated in place: an update produces a new value that
/// replaces the old one in the cache. The JSON form is used for partial
/// (`select`) updates, so field names in a select clause refer to the
/// serialized names.
pub trait Entity: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Unique key of this entity within its cache.
    ///
    /// Usually the `id` field. Entities without a natural id build a
    /// composite key (see [`composite_key`]).
    fn cache_key(&self) -> String;
}

/// Request parameters for getters and views.
///
/// The serialized form is the params fingerprint used for query-cache keys
/// and poll keys, so two logically identical params must serialize the same.
pub trait Params: Clone + Send + Sync + Serialize + 'static {}

impl<P> Params for P where P: Clone + Send + Sync + Serialize + 'static {}

/// Maps params to a string key: an entity key for entity getters, a scope
/// key for [`TargetedDataCache`](crate::TargetedDataCache).
pub type KeyFn<P> = Arc<dyn Fn(&P) -> String + Send + Sync>;

/// Stable string fingerprint of any serializable value.
pub(crate) fn fingerprint<V: Serialize + ?Sized>(value: &V) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Join several identifying fields into one cache key.
///
/// Used for entities keyed by more than one field, e.g. certificates keyed
/// by thumbprint algorithm and thumbprint.
pub fn composite_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|p| p.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join("")
}

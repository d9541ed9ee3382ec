// ── Cache layer ──
//
// Entity storage shared by every getter and view of one resource type.

mod data_cache;
mod listeners;
mod query_cache;
mod registry;
mod targeted;

pub use data_cache::DataCache;
pub use listeners::{CacheEvent, Subscription};
pub use query_cache::{CachedKeyList, QueryCache};
pub use registry::{CacheRegistry, ClearableCache};
pub use targeted::TargetedDataCache;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Sort direction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Whether the presented order covers every item the source can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SortingStatus {
    #[default]
    Valid,
    /// Sorted over a partial load; unseen pages may belong anywhere.
    Partial,
}

/// Current sort key (`None`: source order) and direction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortingInfo {
    pub key: Option<String>,
    pub direction: SortDirection,
}

pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Named comparators the presenter can sort by.
pub struct ListSortConfig<T> {
    comparators: IndexMap<String, Comparator<T>>,
}

impl<T> Default for ListSortConfig<T> {
    fn default() -> Self {
        Self {
            comparators: IndexMap::new(),
        }
    }
}

impl<T> Clone for ListSortConfig<T> {
    fn clone(&self) -> Self {
        Self {
            comparators: self.comparators.clone(),
        }
    }
}

impl<T> fmt::Debug for ListSortConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.comparators.keys()).finish()
    }
}

impl<T: 'static> ListSortConfig<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        key: impl Into<String>,
        compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.comparators.insert(key.into(), Arc::new(compare));
        self
    }

    /// Compare by an `Ord` projection of the item.
    #[must_use]
    pub fn by_key<K: Ord>(
        self,
        key: impl Into<String>,
        project: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> Self {
        self.with(key, move |a, b| project(a).cmp(&project(b)))
    }

    pub fn get(&self, key: &str) -> Option<&Comparator<T>> {
        self.comparators.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.comparators.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.comparators.keys().map(String::as_str)
    }
}

/// Stable sort; items comparing equal keep their source order in both
/// directions.
pub(crate) fn stable_sort<T>(items: &mut [Arc<T>], compare: &Comparator<T>, direction: SortDirection) {
    match direction {
        SortDirection::Asc => items.sort_by(|a, b| compare(&**a, &**b)),
        SortDirection::Desc => items.sort_by(|a, b| compare(&**b, &**a)),
    }
}

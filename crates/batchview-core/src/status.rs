use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Loading status published by every view and by the list data provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoadingStatus {
    #[default]
    Loading,
    Ready,
    Error,
}

/// Lifecycle of an [`EntityView`](crate::EntityView).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EntityViewState {
    #[default]
    Empty,
    Fetching,
    Ready,
    Error,
    /// The watched entity disappeared from the cache.
    Deleted,
}

/// Lifecycle of a [`ListView`](crate::ListView).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ListViewState {
    #[default]
    Empty,
    /// First page in flight.
    Loading,
    /// A further page is in flight while earlier pages are shown.
    LoadingMore,
    Ready,
    Error,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn loading_status_round_trips_through_strings() {
        assert_eq!(LoadingStatus::Ready.to_string(), "ready");
        assert_eq!("error".parse::<LoadingStatus>().unwrap(), LoadingStatus::Error);
    }

    #[test]
    fn list_state_display_is_kebab_case() {
        assert_eq!(ListViewState::LoadingMore.to_string(), "loading-more");
    }
}

// ── List presentation ──
//
// Provider: normalizes any item source into streams.
// Presenter: client-side sorting on top of a provider.

mod presenter;
mod provider;
mod sort;

pub use presenter::ListDataPresenter;
pub use provider::{DataSource, ListDataProvider, LiveList, ProviderSnapshot};
pub use sort::{Comparator, ListSortConfig, SortDirection, SortingInfo, SortingStatus};

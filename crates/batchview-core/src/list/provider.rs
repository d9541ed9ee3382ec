// ── List data provider ──
//
// Normalizes a plain array, a fixed snapshot, or a live ListView into one
// set of streams. Live sources are forwarded by a bridge task; the
// synchronous `snapshot()` always reads through to the source.

use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::entity::{Entity, Params};
use crate::error::CoreError;
use crate::status::LoadingStatus;
use crate::stream::{ItemList, ViewStream};
use crate::sync::lock;
use crate::view::ListView;

/// A list that keeps changing and can load more of itself.
pub trait LiveList<T>: Send + Sync {
    fn items(&self) -> ViewStream<ItemList<T>>;
    fn status(&self) -> ViewStream<LoadingStatus>;
    fn new_data_status(&self) -> ViewStream<LoadingStatus>;
    fn has_more(&self) -> ViewStream<bool>;
    /// Load every remaining item.
    fn fetch_all(&self) -> BoxFuture<'_, Result<(), CoreError>>;
}

impl<P: Params, T: Entity> LiveList<T> for ListView<P, T> {
    fn items(&self) -> ViewStream<ItemList<T>> {
        ListView::items(self)
    }

    fn status(&self) -> ViewStream<LoadingStatus> {
        ListView::status(self)
    }

    fn new_data_status(&self) -> ViewStream<LoadingStatus> {
        ListView::new_data_status(self)
    }

    fn has_more(&self) -> ViewStream<bool> {
        ListView::has_more(self)
    }

    fn fetch_all(&self) -> BoxFuture<'_, Result<(), CoreError>> {
        ListView::fetch_all(self).boxed()
    }
}

/// Input of a [`ListDataProvider`].
pub enum DataSource<T> {
    Array(Vec<T>),
    Collection(ItemList<T>),
    View(Arc<dyn LiveList<T>>),
}

impl<T> Clone for DataSource<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Self::Array(items) => Self::Array(items.clone()),
            Self::Collection(items) => Self::Collection(Arc::clone(items)),
            Self::View(view) => Self::View(Arc::clone(view)),
        }
    }
}

impl<T> From<Vec<T>> for DataSource<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items)
    }
}

impl<T> From<ItemList<T>> for DataSource<T> {
    fn from(items: ItemList<T>) -> Self {
        Self::Collection(items)
    }
}

impl<P: Params, T: Entity> From<Arc<ListView<P, T>>> for DataSource<T> {
    fn from(view: Arc<ListView<P, T>>) -> Self {
        Self::View(view)
    }
}

/// Point-in-time state of the provider's source.
#[derive(Debug)]
pub struct ProviderSnapshot<T> {
    pub items: ItemList<T>,
    pub status: LoadingStatus,
    pub has_more: bool,
}

/// Resolved form of the source, kept for synchronous reads.
enum Source<T> {
    Static(ItemList<T>),
    Live(Arc<dyn LiveList<T>>),
}

struct Channels<T> {
    items: watch::Sender<ItemList<T>>,
    status: watch::Sender<LoadingStatus>,
    new_data_status: watch::Sender<LoadingStatus>,
    has_more: watch::Sender<bool>,
}

impl<T> Channels<T> {
    fn publish(&self, items: ItemList<T>, status: LoadingStatus, new_data_status: LoadingStatus, has_more: bool) {
        self.items.send_replace(items);
        self.status.send_replace(status);
        self.new_data_status.send_replace(new_data_status);
        self.has_more.send_replace(has_more);
    }
}

/// One reactive item list over any [`DataSource`].
pub struct ListDataProvider<T> {
    source: Mutex<Source<T>>,
    channels: Arc<Channels<T>>,
    bridge: Mutex<Option<CancellationToken>>,
}

impl<T: Send + Sync + 'static> Default for ListDataProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> ListDataProvider<T> {
    /// An empty provider (no items, nothing more to load).
    pub fn new() -> Self {
        Self {
            source: Mutex::new(Source::Static(Arc::new(Vec::new()))),
            channels: Arc::new(Channels {
                items: watch::channel(Arc::new(Vec::new())).0,
                status: watch::channel(LoadingStatus::Ready).0,
                new_data_status: watch::channel(LoadingStatus::Ready).0,
                has_more: watch::channel(false).0,
            }),
            bridge: Mutex::new(None),
        }
    }

    /// Provider over `source`. Live sources need a Tokio runtime.
    pub fn with_source(source: impl Into<DataSource<T>>) -> Result<Self, CoreError> {
        let provider = Self::new();
        provider.set_source(source)?;
        Ok(provider)
    }

    /// Replace the source. Streams switch over immediately.
    pub fn set_source(&self, source: impl Into<DataSource<T>>) -> Result<(), CoreError> {
        self.stop_bridge();
        match source.into() {
            DataSource::Array(items) => {
                self.set_static(Arc::new(items.into_iter().map(Arc::new).collect()));
            }
            DataSource::Collection(items) => self.set_static(items),
            DataSource::View(view) => self.set_live(view)?,
        }
        Ok(())
    }

    pub fn items(&self) -> ViewStream<ItemList<T>> {
        ViewStream::new(self.channels.items.subscribe())
    }

    pub fn status(&self) -> ViewStream<LoadingStatus> {
        ViewStream::new(self.channels.status.subscribe())
    }

    pub fn new_data_status(&self) -> ViewStream<LoadingStatus> {
        ViewStream::new(self.channels.new_data_status.subscribe())
    }

    pub fn has_more(&self) -> ViewStream<bool> {
        ViewStream::new(self.channels.has_more.subscribe())
    }

    /// Current state, read straight from the source.
    pub fn snapshot(&self) -> ProviderSnapshot<T> {
        match &*lock(&self.source) {
            Source::Static(items) => ProviderSnapshot {
                items: Arc::clone(items),
                status: LoadingStatus::Ready,
                has_more: false,
            },
            Source::Live(view) => ProviderSnapshot {
                items: Arc::clone(&view.items().current()),
                status: *view.status().current(),
                has_more: *view.has_more().current(),
            },
        }
    }

    /// Load everything a live source has left. Static sources are complete.
    pub async fn fetch_all(&self) -> Result<(), CoreError> {
        let live = match &*lock(&self.source) {
            Source::Static(_) => None,
            Source::Live(view) => Some(Arc::clone(view)),
        };
        match live {
            Some(view) => view.fetch_all().await,
            None => Ok(()),
        }
    }

    /// Stop forwarding from a live source.
    pub fn dispose(&self) {
        self.stop_bridge();
    }

    fn set_static(&self, items: ItemList<T>) {
        *lock(&self.source) = Source::Static(Arc::clone(&items));
        self.channels
            .publish(items, LoadingStatus::Ready, LoadingStatus::Ready, false);
    }

    fn set_live(&self, view: Arc<dyn LiveList<T>>) -> Result<(), CoreError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| CoreError::Runtime(e.to_string()))?;

        let mut items = view.items();
        let mut status = view.status();
        let mut new_data_status = view.new_data_status();
        let mut has_more = view.has_more();

        // Publish the current state before the bridge starts, so no reader
        // ever sees the previous source's values after this returns.
        self.channels.publish(
            items.latest(),
            status.latest(),
            new_data_status.latest(),
            has_more.latest(),
        );
        *lock(&self.source) = Source::Live(view);

        let cancel = CancellationToken::new();
        *lock(&self.bridge) = Some(cancel.clone());

        let channels = Arc::clone(&self.channels);

        runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    next = items.changed() => match next {
                        Some(next) => { channels.items.send_replace(next); }
                        None => break,
                    },
                    Some(next) = status.changed() => { channels.status.send_replace(next); }
                    Some(next) = has_more.changed() => { channels.has_more.send_replace(next); }
                    Some(next) = new_data_status.changed() => { channels.new_data_status.send_replace(next); }
                    else => break,
                }
            }
            debug!("provider bridge stopped");
        });
        Ok(())
    }

    fn stop_bridge(&self) {
        if let Some(cancel) = lock(&self.bridge).take() {
            cancel.cancel();
        }
    }
}

impl<T> Drop for ListDataProvider<T> {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.bridge).take() {
            cancel.cancel();
        }
    }
}

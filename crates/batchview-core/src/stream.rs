// ── Reactive value streams ──
//
// Thin handle over a `watch` receiver, vended by views, the provider,
// and the presenter. Holds the latest value; intermediate values may be
// coalesced, the final one never is.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Items snapshot shared by list views, the provider, and the presenter.
pub type ItemList<T> = Arc<Vec<Arc<T>>>;

/// Subscription handle for one reactive value.
///
/// Exposes `current()` / `latest()` / `changed()` for consumers that render
/// on change, and `into_stream()` for `Stream` combinators.
#[derive(Debug)]
pub struct ViewStream<V> {
    rx: watch::Receiver<V>,
}

impl<V> Clone for ViewStream<V> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> ViewStream<V> {
    pub(crate) fn new(rx: watch::Receiver<V>) -> Self {
        Self { rx }
    }

    /// Borrow the current value without marking it seen.
    pub fn current(&self) -> watch::Ref<'_, V> {
        self.rx.borrow()
    }

    /// Clone the current value and mark it seen.
    pub fn latest(&mut self) -> V {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next value. Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<V> {
        self.rx.changed().await.ok()?;
        Some(self.latest())
    }

    /// Wait until the value satisfies `predicate` (checked immediately first).
    pub async fn wait_for(&mut self, predicate: impl FnMut(&V) -> bool) -> Option<V> {
        self.rx.wait_for(predicate).await.ok().map(|v| v.clone())
    }

    /// Convert into a `Stream` yielding the current value, then every change.
    pub fn into_stream(self) -> WatchStream<V> {
        WatchStream::new(self.rx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn changed_yields_latest_value() {
        let (tx, rx) = watch::channel(0u32);
        let mut stream = ViewStream::new(rx);
        tx.send_replace(1);
        tx.send_replace(2);
        assert_eq!(stream.changed().await, Some(2));
        assert_eq!(*stream.current(), 2);
    }

    #[test]
    fn changed_waits_for_a_new_value() {
        let (tx, rx) = watch::channel(0u32);
        let mut stream = ViewStream::new(rx);
        let mut changed = tokio_test::task::spawn(stream.changed());
        tokio_test::assert_pending!(changed.poll());
        tx.send_replace(7);
        assert!(changed.is_woken());
        assert_eq!(tokio_test::assert_ready!(changed.poll()), Some(7));
    }

    #[tokio::test]
    async fn changed_returns_none_when_publisher_dropped() {
        let (tx, rx) = watch::channel(0u32);
        let mut stream = ViewStream::new(rx);
        drop(tx);
        assert_eq!(stream.changed().await, None);
    }

    #[tokio::test]
    async fn into_stream_starts_with_current_value() {
        let (tx, rx) = watch::channel("a");
        let mut stream = ViewStream::new(rx).into_stream();
        assert_eq!(stream.next().await, Some("a"));
        tx.send_replace("b");
        assert_eq!(stream.next().await, Some("b"));
    }
}

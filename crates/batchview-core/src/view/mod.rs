// ── Views ──
//
// Stateful, reactive projections of the cache for one UI consumer.
// Shared plumbing lives here: status/error channels, the generation
// counter that guards against stale responses, and the in-flight handle.

mod entity;
mod list;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreError;
use crate::status::LoadingStatus;
use crate::stream::ViewStream;
use crate::sync::lock;

pub use entity::EntityView;
pub use list::ListView;

const DELETED_CHANNEL_SIZE: usize = 64;

/// In-flight view request. Cloneable; every clone resolves to the same result.
pub type SharedFetch<R> = Shared<BoxFuture<'static, Result<R, CoreError>>>;

/// Decides whether an error is reported. Returning `false` makes the view
/// behave as if the request had succeeded without data.
pub type ErrorFilter = Arc<dyn Fn(&CoreError) -> bool + Send + Sync>;

pub(crate) fn resolved<R: Clone + Send + 'static>(result: Result<R, CoreError>) -> SharedFetch<R> {
    futures_util::future::ready(result).boxed().shared()
}

/// Status, error, and lifecycle channels common to every view.
pub(crate) struct ViewSignals {
    status: watch::Sender<LoadingStatus>,
    new_data_status: watch::Sender<LoadingStatus>,
    error: watch::Sender<Option<CoreError>>,
    deleted: broadcast::Sender<String>,
    generation: AtomicU64,
    awaiting_new_data: Mutex<bool>,
    on_error: Mutex<Option<ErrorFilter>>,
    disposed: CancellationToken,
}

impl ViewSignals {
    pub(crate) fn new() -> Self {
        let (deleted, _) = broadcast::channel(DELETED_CHANNEL_SIZE);
        Self {
            status: watch::channel(LoadingStatus::Loading).0,
            new_data_status: watch::channel(LoadingStatus::Loading).0,
            error: watch::channel(None).0,
            deleted,
            generation: AtomicU64::new(0),
            awaiting_new_data: Mutex::new(true),
            on_error: Mutex::new(None),
            disposed: CancellationToken::new(),
        }
    }

    // ── Generation guard ────────────────────────────────────────────

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate every request issued so far.
    pub(crate) fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether a response issued at `generation` may still be applied.
    pub(crate) fn accepts(&self, generation: u64) -> bool {
        if self.is_disposed() {
            return false;
        }
        let current = self.generation();
        if current != generation {
            debug!(generation, current, "discarding stale response");
            return false;
        }
        true
    }

    // ── Status ──────────────────────────────────────────────────────

    /// Params changed: the next completed request decides `new_data_status`.
    pub(crate) fn expect_new_data(&self) {
        *lock(&self.awaiting_new_data) = true;
        self.new_data_status.send_if_modified(|s| replace_if_changed(s, LoadingStatus::Loading));
    }

    pub(crate) fn begin_loading(&self) {
        self.error.send_if_modified(|e| e.take().is_some());
        self.set_status(LoadingStatus::Loading);
    }

    pub(crate) fn finish_ok(&self) {
        self.set_status(LoadingStatus::Ready);
    }

    /// Record `err` unless the error filter swallows it. Returns whether
    /// the error was recorded.
    pub(crate) fn finish_err(&self, err: &CoreError) -> bool {
        let filter = lock(&self.on_error).clone();
        if filter.is_some_and(|keep| !keep(err)) {
            debug!(error = %err, "error suppressed by view filter");
            self.set_status(LoadingStatus::Ready);
            return false;
        }
        self.error.send_replace(Some(err.clone()));
        self.set_status(LoadingStatus::Error);
        true
    }

    /// Params or options were reset: nothing is loaded for them yet.
    pub(crate) fn reset_status(&self) {
        self.error.send_if_modified(|e| e.take().is_some());
        self.status
            .send_if_modified(|s| replace_if_changed(s, LoadingStatus::Loading));
    }

    fn set_status(&self, status: LoadingStatus) {
        self.status.send_if_modified(|s| replace_if_changed(s, status));
        if status == LoadingStatus::Loading {
            return;
        }
        let mut awaiting = lock(&self.awaiting_new_data);
        if *awaiting {
            *awaiting = false;
            drop(awaiting);
            self.new_data_status.send_if_modified(|s| replace_if_changed(s, status));
        }
    }

    pub(crate) fn set_error_filter(&self, filter: Option<ErrorFilter>) {
        *lock(&self.on_error) = filter;
    }

    pub(crate) fn emit_deleted(&self, key: &str) {
        if !self.is_disposed() {
            let _ = self.deleted.send(key.to_owned());
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.is_cancelled() {
            return false;
        }
        self.disposed.cancel();
        true
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.is_cancelled()
    }

    pub(crate) fn disposed_token(&self) -> CancellationToken {
        self.disposed.clone()
    }

    // ── Streams ─────────────────────────────────────────────────────

    pub(crate) fn status(&self) -> ViewStream<LoadingStatus> {
        ViewStream::new(self.status.subscribe())
    }

    pub(crate) fn new_data_status(&self) -> ViewStream<LoadingStatus> {
        ViewStream::new(self.new_data_status.subscribe())
    }

    pub(crate) fn error(&self) -> ViewStream<Option<CoreError>> {
        ViewStream::new(self.error.subscribe())
    }

    pub(crate) fn deleted(&self) -> broadcast::Receiver<String> {
        self.deleted.subscribe()
    }
}

/// `send_if_modified` helper for `PartialEq` values.
pub(crate) fn replace_if_changed<V: PartialEq>(slot: &mut V, value: V) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

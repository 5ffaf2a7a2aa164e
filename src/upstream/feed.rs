//! The change-feed capability consumed by the coordinator.
//!
//! A [`ChangeFeed`] is the backend real-time layer: it opens a watch on a
//! resource for an identity, pushes every change into the [`EventSink`]
//! registered at open time, and closes the watch on request.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ChangeEvent, Identity, ResourceKey, WatchId};
use crate::error::HubError;

/// Backend real-time layer.
///
/// # Cancellation
///
/// The coordinator cancels an in-flight open by dropping the future
/// returned by [`ChangeFeed::open_watch`]. Implementations must not leave
/// a live watch behind when that happens: register the watch only after
/// the last suspension point.
#[async_trait]
pub trait ChangeFeed: Send + Sync + fmt::Debug {
    /// Opens a watch on `resource` owned by `identity`.
    ///
    /// Every change must be delivered to `sink`, in upstream order, until
    /// the watch is closed. A watch that dies on the backend side is
    /// reported through [`EventSink::fail`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::FeedUnavailable`] when the backend cannot be
    /// reached and [`HubError::OpenRejected`] when it refuses the watch.
    async fn open_watch(
        &self,
        resource: &ResourceKey,
        identity: &Identity,
        sink: EventSink,
    ) -> Result<WatchHandle, HubError>;

    /// Closes a watch. Closing an unknown or already-closed handle is a no-op.
    async fn close_watch(&self, handle: &WatchHandle);

    /// Short backend name used in logs and status output.
    fn backend(&self) -> &'static str;
}

type LossHandler = Arc<dyn Fn(HubError) + Send + Sync>;

/// Receiver side of an upstream watch, registered at open time.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(ChangeEvent) + Send + Sync>,
    lost: Option<LossHandler>,
}

impl EventSink {
    /// Wraps a delivery callback.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
            lost: None,
        }
    }

    /// Adds a callback invoked when the backend drops the watch.
    #[must_use]
    pub fn on_lost<F>(mut self, lost: F) -> Self
    where
        F: Fn(HubError) + Send + Sync + 'static,
    {
        self.lost = Some(Arc::new(lost));
        self
    }

    /// Hands one upstream event to the owner of the watch.
    pub fn deliver(&self, event: ChangeEvent) {
        (self.deliver)(event);
    }

    /// Tells the owner the watch is gone and no more events will arrive.
    pub fn fail(&self, err: HubError) {
        if let Some(lost) = &self.lost {
            lost(err);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Opaque handle to an open watch.
///
/// Deliberately not `Clone`: the handle is owned by exactly one
/// [`super::UpstreamConnection`].
#[derive(Debug, PartialEq, Eq)]
pub struct WatchHandle {
    id: WatchId,
}

impl WatchHandle {
    /// Allocates a handle with a fresh [`WatchId`].
    #[must_use]
    pub fn new() -> Self {
        Self { id: WatchId::new() }
    }

    /// Returns the watch id.
    #[must_use]
    pub const fn id(&self) -> WatchId {
        self.id
    }
}

impl Default for WatchHandle {
    fn default() -> Self {
        Self::new()
    }
}

//! A single logical watch session against one change feed.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{ChangeFeed, EventSink, WatchHandle};
use crate::domain::{Identity, ResourceKey, WatchId};
use crate::error::HubError;

/// One upstream watch on `resource` owned by `identity`.
///
/// Owned exclusively by a [`crate::coordinator::SubscriptionCoordinator`];
/// feature modules never see it. [`UpstreamConnection::close`] is
/// idempotent. A close requested while [`UpstreamConnection::open`] is
/// still pending is expressed by dropping the open future, which the
/// [`ChangeFeed`] contract makes safe.
#[derive(Debug)]
pub struct UpstreamConnection {
    feed: Arc<dyn ChangeFeed>,
    resource: ResourceKey,
    identity: Identity,
    handle: Option<WatchHandle>,
    opened_at: DateTime<Utc>,
}

impl UpstreamConnection {
    /// Opens a watch and wraps the resulting handle.
    ///
    /// # Errors
    ///
    /// Propagates the feed's open failure.
    pub async fn open(
        feed: Arc<dyn ChangeFeed>,
        resource: ResourceKey,
        identity: Identity,
        sink: EventSink,
    ) -> Result<Self, HubError> {
        let handle = feed.open_watch(&resource, &identity, sink).await?;
        tracing::info!(
            %resource,
            watch_id = %handle.id(),
            backend = feed.backend(),
            "upstream watch opened"
        );
        Ok(Self {
            feed,
            resource,
            identity,
            handle: Some(handle),
            opened_at: Utc::now(),
        })
    }

    /// Closes the watch. Subsequent calls are no-ops.
    pub async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.feed.close_watch(&handle).await;
            tracing::info!(resource = %self.resource, watch_id = %handle.id(), "upstream watch closed");
        }
    }

    /// Returns `true` until [`UpstreamConnection::close`] has run.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Resource this connection watches.
    #[must_use]
    pub const fn resource(&self) -> &ResourceKey {
        &self.resource
    }

    /// Identity that owns the watch.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Id of the live watch, if still open.
    #[must_use]
    pub fn watch_id(&self) -> Option<WatchId> {
        self.handle.as_ref().map(WatchHandle::id)
    }

    /// When the watch was acknowledged by the feed.
    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }
}

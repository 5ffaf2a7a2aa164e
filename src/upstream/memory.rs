//! In-process change feed.
//!
//! [`InMemoryChangeFeed`] stands in for a hosted backend during local
//! development: changes are injected with [`InMemoryChangeFeed::emit`]
//! and delivered to every open watch on the resource. It can simulate
//! open latency and rejected opens, and it counts what the coordinator
//! asked of it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChangeFeed, EventSink, WatchHandle};
use crate::domain::{ChangeEvent, Identity, ResourceKey, WatchId};
use crate::error::HubError;

#[derive(Debug)]
struct Watch {
    resource: ResourceKey,
    identity: Identity,
    sink: EventSink,
}

/// Change feed living entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryChangeFeed {
    watches: Mutex<HashMap<WatchId, Watch>>,
    queued_failures: Mutex<VecDeque<String>>,
    open_latency: Duration,
    opens: AtomicU64,
    close_calls: AtomicU64,
    /// In-flight opens plus live watches.
    occupancy: AtomicUsize,
    peak_occupancy: AtomicUsize,
}

impl InMemoryChangeFeed {
    /// Creates a feed that acknowledges opens immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every open acknowledgment by `latency`.
    #[must_use]
    pub fn with_open_latency(mut self, latency: Duration) -> Self {
        self.open_latency = latency;
        self
    }

    /// Makes the next open fail with `reason`. Calls queue up.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.queued_failures.lock().push_back(reason.into());
    }

    /// Delivers a change to every open watch on `resource`.
    ///
    /// Returns the number of watches that received it.
    pub fn emit(&self, resource: &ResourceKey, payload: serde_json::Value) -> usize {
        self.deliver(resource, None, payload)
    }

    /// Delivers a change only to watches on `resource` owned by `identity`.
    pub fn emit_to(
        &self,
        resource: &ResourceKey,
        identity: &Identity,
        payload: serde_json::Value,
    ) -> usize {
        self.deliver(resource, Some(identity), payload)
    }

    fn deliver(
        &self,
        resource: &ResourceKey,
        identity: Option<&Identity>,
        payload: serde_json::Value,
    ) -> usize {
        let sinks: Vec<EventSink> = self
            .watches
            .lock()
            .values()
            .filter(|w| &w.resource == resource && identity.is_none_or(|id| &w.identity == id))
            .map(|w| w.sink.clone())
            .collect();
        for sink in &sinks {
            sink.deliver(ChangeEvent::new(resource.clone(), payload.clone()));
        }
        sinks.len()
    }

    /// Drops every open watch on `resource` as if the backend lost it,
    /// reporting `reason` to each owner. Returns the number dropped.
    pub fn sever(&self, resource: &ResourceKey, reason: &str) -> usize {
        let severed: Vec<Watch> = {
            let mut watches = self.watches.lock();
            let ids: Vec<WatchId> = watches
                .iter()
                .filter(|(_, w)| &w.resource == resource)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| watches.remove(id)).collect()
        };
        for watch in &severed {
            self.occupancy.fetch_sub(1, Ordering::SeqCst);
            watch
                .sink
                .fail(HubError::FeedUnavailable(reason.to_string()));
        }
        severed.len()
    }

    /// Number of watches currently open.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.watches.lock().len()
    }

    /// Identities owning the currently open watches.
    #[must_use]
    pub fn active_identities(&self) -> Vec<Identity> {
        self.watches
            .lock()
            .values()
            .map(|w| w.identity.clone())
            .collect()
    }

    /// Total open requests received, including failed and cancelled ones.
    #[must_use]
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Total close requests received, including redundant ones.
    #[must_use]
    pub fn close_calls(&self) -> u64 {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously in-flight or open watches seen.
    #[must_use]
    pub fn peak_occupancy(&self) -> usize {
        self.peak_occupancy.load(Ordering::SeqCst)
    }
}

/// Counts an open as occupying a slot until it either turns into a live
/// watch (`commit`) or is dropped by failure or cancellation.
struct PendingOpen<'a> {
    feed: &'a InMemoryChangeFeed,
    committed: bool,
}

impl<'a> PendingOpen<'a> {
    fn enter(feed: &'a InMemoryChangeFeed) -> Self {
        let now = feed.occupancy.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        feed.peak_occupancy.fetch_max(now, Ordering::SeqCst);
        Self {
            feed,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingOpen<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.feed.occupancy.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn open_watch(
        &self,
        resource: &ResourceKey,
        identity: &Identity,
        sink: EventSink,
    ) -> Result<WatchHandle, HubError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let pending = PendingOpen::enter(self);

        if !self.open_latency.is_zero() {
            tokio::time::sleep(self.open_latency).await;
        }

        let failure = self.queued_failures.lock().pop_front();
        if let Some(reason) = failure {
            return Err(HubError::OpenRejected {
                resource: resource.to_string(),
                reason,
            });
        }

        let handle = WatchHandle::new();
        self.watches.lock().insert(
            handle.id(),
            Watch {
                resource: resource.clone(),
                identity: identity.clone(),
                sink,
            },
        );
        pending.commit();
        Ok(handle)
    }

    async fn close_watch(&self, handle: &WatchHandle) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.watches.lock().remove(&handle.id()).is_some() {
            self.occupancy.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

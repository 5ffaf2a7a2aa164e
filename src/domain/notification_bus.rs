//! Keyed broadcast bus for change notifications.
//!
//! [`NotificationBus`] keeps one [`tokio::sync::broadcast`] channel per
//! resource key. Coordinators publish every relayed [`ChangeEvent`]
//! through it, and feature modules attach listeners for the keys they
//! care about. Listeners only see events published after they attach.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use super::{ChangeEvent, ResourceKey};

/// Fan-out point for [`ChangeEvent`]s, keyed by [`ResourceKey`].
///
/// Cloning is cheap and every clone publishes to the same listeners.
/// Each per-key channel is a ring buffer of the configured capacity;
/// listeners that fall further behind lose the oldest events.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    capacity: usize,
    channels: Mutex<HashMap<ResourceKey, broadcast::Sender<ChangeEvent>>>,
}

impl NotificationBus {
    /// Creates a new bus whose per-key channels hold `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publishes an event to every listener attached to its resource key.
    ///
    /// Returns the number of listeners the event was delivered to. With
    /// no listeners attached the event is silently dropped.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let sender = self.inner.channels.lock().get(&event.resource).cloned();
        sender.map_or(0, |sender| sender.send(event).unwrap_or(0))
    }

    /// Per-key channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Attaches a receiver for future events on `resource`.
    ///
    /// Dropping the receiver detaches it.
    #[must_use]
    pub fn listen(&self, resource: &ResourceKey) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.inner.channels.lock();
        channels
            .entry(resource.clone())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe()
    }

    /// Attaches a callback invoked for every future event on `resource`.
    ///
    /// The callback runs on a dedicated task, in publish order. Must be
    /// called from within a Tokio runtime.
    pub fn on_change<F>(&self, resource: ResourceKey, mut callback: F) -> ChangeListener
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let mut rx = self.listen(&resource);
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%resource, lagged = n, "change listener lagged behind notification bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        ChangeListener {
            task: task.abort_handle(),
        }
    }

    /// Returns the number of listeners currently attached to `resource`.
    #[must_use]
    pub fn listener_count(&self, resource: &ResourceKey) -> usize {
        self.inner
            .channels
            .lock()
            .get(resource)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// Handle to a callback attached with [`NotificationBus::on_change`].
///
/// Dropping the handle detaches the callback.
#[derive(Debug)]
pub struct ChangeListener {
    task: AbortHandle,
}

impl ChangeListener {
    /// Detaches the callback. Events published afterwards are not delivered.
    pub fn detach(self) {
        self.task.abort();
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    fn key(name: &str) -> ResourceKey {
        let Ok(key) = ResourceKey::new(name) else {
            panic!("valid key");
        };
        key
    }

    fn make_event(name: &str) -> ChangeEvent {
        ChangeEvent::new(key(name), serde_json::json!({"op": "INSERT"}))
    }

    #[test]
    fn publish_without_listeners_returns_zero() {
        let bus = NotificationBus::new(16);
        assert_eq!(bus.publish(make_event("tasks")), 0);
    }

    #[tokio::test]
    async fn listener_receives_event() {
        let bus = NotificationBus::new(16);
        let mut rx = bus.listen(&key("tasks"));

        assert_eq!(bus.publish(make_event("tasks")), 1);

        let Ok(event) = rx.recv().await else {
            panic!("expected to receive event");
        };
        assert_eq!(event.resource, key("tasks"));
    }

    #[tokio::test]
    async fn every_listener_gets_one_delivery() {
        let bus = NotificationBus::new(16);
        let mut receivers: Vec<_> = (0..4).map(|_| bus.listen(&key("tasks"))).collect();

        let event = make_event("tasks");
        assert_eq!(bus.publish(event.clone()), 4);

        for rx in &mut receivers {
            let Ok(received) = rx.try_recv() else {
                panic!("listener missed the event");
            };
            assert_eq!(received, event);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn listeners_are_isolated_by_key() {
        let bus = NotificationBus::new(16);
        let mut clients = bus.listen(&key("clients"));

        assert_eq!(bus.publish(make_event("tasks")), 0);
        assert!(clients.try_recv().is_err());
    }

    #[test]
    fn late_listener_gets_no_replay() {
        let bus = NotificationBus::new(16);
        let _early = bus.listen(&key("tasks"));
        bus.publish(make_event("tasks"));

        let mut late = bus.listen(&key("tasks"));
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn listener_count_tracks_receivers() {
        let bus = NotificationBus::new(16);
        let tasks = key("tasks");
        assert_eq!(bus.listener_count(&tasks), 0);

        let rx1 = bus.listen(&tasks);
        let _rx2 = bus.listen(&tasks);
        assert_eq!(bus.listener_count(&tasks), 2);

        drop(rx1);
        assert_eq!(bus.listener_count(&tasks), 1);
    }

    #[tokio::test]
    async fn callback_runs_until_detached() {
        let bus = NotificationBus::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = bus.on_change(key("tasks"), move |event| {
            let _ = tx.send(event);
        });

        bus.publish(make_event("tasks"));
        let Some(event) = rx.recv().await else {
            panic!("callback not invoked");
        };
        assert_eq!(event.resource, key("tasks"));

        listener.detach();
        tokio::task::yield_now().await;
        bus.publish(make_event("tasks"));

        let next = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(next, Ok(Some(_))));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = NotificationBus::new(0);
        let mut rx = bus.listen(&key("tasks"));
        assert_eq!(bus.publish(make_event("tasks")), 1);
        assert!(rx.try_recv().is_ok());
    }
}

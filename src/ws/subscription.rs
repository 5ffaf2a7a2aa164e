//! Per-connection subscription manager.
//!
//! Each WebSocket connection behaves like one feature module: it holds a
//! coordinator subscription and a bus listener for every resource it
//! watches, and gives both back when it unsubscribes or disconnects.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::coordinator::CoordinatorRegistry;
use crate::domain::{ChangeEvent, ChangeListener, Identity, NotificationBus, ResourceKey};
use crate::error::HubError;

/// Tracks the resources a single WebSocket client is subscribed to.
#[derive(Debug)]
pub struct SubscriptionManager {
    identity: Option<Identity>,
    listeners: HashMap<ResourceKey, ChangeListener>,
    events_tx: mpsc::Sender<ChangeEvent>,
}

impl SubscriptionManager {
    /// Creates an empty manager forwarding matched events to `events_tx`.
    ///
    /// Events that do not fit in `events_tx` are dropped with a warning.
    #[must_use]
    pub fn new(events_tx: mpsc::Sender<ChangeEvent>) -> Self {
        Self {
            identity: None,
            listeners: HashMap::new(),
            events_tx,
        }
    }

    /// Subscribes to `resources` on behalf of `identity`.
    ///
    /// Resources already subscribed are skipped. If `identity` differs
    /// from the one used earlier, existing subscriptions move over to it.
    /// Returns the newly added resources.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownResource`] if any resource has no
    /// coordinator; nothing is subscribed in that case.
    pub fn subscribe(
        &mut self,
        registry: &CoordinatorRegistry,
        bus: &NotificationBus,
        identity: Identity,
        resources: &[ResourceKey],
    ) -> Result<Vec<ResourceKey>, HubError> {
        let coordinators = resources
            .iter()
            .map(|resource| registry.get(resource))
            .collect::<Result<Vec<_>, _>>()?;

        if self.identity.as_ref().is_some_and(|bound| *bound != identity) {
            for resource in self.listeners.keys() {
                if let Ok(coordinator) = registry.get(resource) {
                    coordinator.subscribe(identity.clone());
                    coordinator.unsubscribe();
                }
            }
        }
        self.identity = Some(identity.clone());

        let mut added = Vec::new();
        for coordinator in coordinators {
            let resource = coordinator.resource().clone();
            if self.listeners.contains_key(&resource) {
                continue;
            }
            let tx = self.events_tx.clone();
            let listener = bus.on_change(resource.clone(), move |event| {
                if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
                    tracing::warn!(resource = %event.resource, "ws client lagging; change dropped");
                }
            });
            coordinator.subscribe(identity.clone());
            self.listeners.insert(resource.clone(), listener);
            added.push(resource);
        }
        Ok(added)
    }

    /// Releases `resources`, returning the ones that were subscribed.
    pub fn unsubscribe(
        &mut self,
        registry: &CoordinatorRegistry,
        resources: &[ResourceKey],
    ) -> Vec<ResourceKey> {
        let mut removed = Vec::new();
        for resource in resources {
            if let Some(listener) = self.listeners.remove(resource) {
                listener.detach();
                if let Ok(coordinator) = registry.get(resource) {
                    coordinator.unsubscribe();
                }
                removed.push(resource.clone());
            }
        }
        if self.listeners.is_empty() {
            self.identity = None;
        }
        removed
    }

    /// Releases every subscription. Called when the connection closes.
    pub fn release_all(&mut self, registry: &CoordinatorRegistry) {
        let resources: Vec<ResourceKey> = self.listeners.keys().cloned().collect();
        self.unsubscribe(registry, &resources);
    }

    /// Returns `true` if `resource` is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, resource: &ResourceKey) -> bool {
        self.listeners.contains_key(resource)
    }

    /// Returns the number of subscribed resources.
    #[must_use]
    pub fn count(&self) -> usize {
        self.listeners.len()
    }
}

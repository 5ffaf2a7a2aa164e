//! The set of coordinators built at startup, one per watched resource.
//!
//! The map is fixed after construction, so lookups need no locking and
//! no coordinator is ever rebuilt while the process runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::SubscriptionCoordinator;
use super::status::CoordinatorStatus;
use crate::domain::{NotificationBus, ResourceKey};
use crate::error::HubError;
use crate::upstream::ChangeFeed;

/// Immutable registry of [`SubscriptionCoordinator`]s keyed by resource.
#[derive(Debug)]
pub struct CoordinatorRegistry {
    coordinators: BTreeMap<ResourceKey, SubscriptionCoordinator>,
}

impl CoordinatorRegistry {
    /// Builds one coordinator per resource, all sharing `feed` and `bus`.
    /// Duplicate resources collapse into one coordinator.
    #[must_use]
    pub fn new(
        feed: &Arc<dyn ChangeFeed>,
        bus: &NotificationBus,
        resources: &[ResourceKey],
        grace_period: Duration,
    ) -> Self {
        let coordinators = resources
            .iter()
            .map(|resource| {
                let coordinator = SubscriptionCoordinator::new(
                    resource.clone(),
                    Arc::clone(feed),
                    bus.clone(),
                    grace_period,
                );
                (resource.clone(), coordinator)
            })
            .collect();
        tracing::info!(
            resources = ?resources.iter().map(ResourceKey::as_str).collect::<Vec<_>>(),
            backend = feed.backend(),
            "coordinators ready"
        );
        Self { coordinators }
    }

    /// Returns the coordinator watching `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownResource`] if no coordinator watches it.
    pub fn get(&self, resource: &ResourceKey) -> Result<&SubscriptionCoordinator, HubError> {
        self.coordinators
            .get(resource)
            .ok_or_else(|| HubError::UnknownResource(resource.to_string()))
    }

    /// Iterates over the coordinators in resource-key order.
    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionCoordinator> {
        self.coordinators.values()
    }

    /// Status of every coordinator, in resource-key order.
    #[must_use]
    pub fn statuses(&self) -> Vec<CoordinatorStatus> {
        self.iter().map(SubscriptionCoordinator::status).collect()
    }

    /// Returns the number of coordinators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    /// Returns `true` if no resource is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Closes every upstream watch and waits for the closes to finish.
    pub async fn shutdown(&self) {
        for coordinator in self.iter() {
            coordinator.shutdown().await;
        }
        tracing::info!("all upstream watches closed");
    }
}

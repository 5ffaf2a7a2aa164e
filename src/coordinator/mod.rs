//! Coordinator layer: shared upstream watches with reference counting.
//!
//! [`SubscriptionCoordinator`] owns the single upstream watch for one
//! resource; [`CoordinatorRegistry`] holds the coordinators built at
//! startup.

pub mod registry;
pub mod status;
pub mod subscription_coordinator;

pub use registry::CoordinatorRegistry;
pub use status::{ConnectionStats, CoordinatorStatus, Phase};
pub use subscription_coordinator::{DEFAULT_GRACE_PERIOD, SubscriptionCoordinator};

//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::coordinator::CoordinatorRegistry;
use crate::domain::NotificationBus;
use crate::upstream::InMemoryChangeFeed;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// One coordinator per watched resource.
    pub registry: Arc<CoordinatorRegistry>,
    /// Fan-out bus the coordinators publish into.
    pub bus: NotificationBus,
    /// Set when running on the in-process feed, so changes can be
    /// injected over HTTP.
    pub local_feed: Option<Arc<InMemoryChangeFeed>>,
}

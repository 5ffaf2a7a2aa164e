//! # changefeed-hub
//!
//! Shares one upstream change-feed watch per resource across any number
//! of in-process listeners.
//!
//! Feature code subscribes to a resource through its
//! [`SubscriptionCoordinator`](coordinator::SubscriptionCoordinator),
//! which owns the single upstream watch, keeps it open while anyone is
//! interested, survives brief unsubscribe/resubscribe churn with a grace
//! window, and republishes every upstream change on a keyed
//! [`NotificationBus`](domain::NotificationBus).
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── CoordinatorRegistry (coordinator/)
//!     │       └── SubscriptionCoordinator ×N ── UpstreamConnection (upstream/)
//!     │
//!     ├── NotificationBus (domain/)
//!     │
//!     └── ChangeFeed: in-memory │ PostgreSQL LISTEN/NOTIFY
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod upstream;
pub mod ws;

//! Coordinator lifecycle phases and status snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Lifecycle phase of a [`super::SubscriptionCoordinator`].
///
/// ```text
/// Idle ──subscribe──▶ Connecting ──ok──▶ Active ──count=0──▶ TearingDown ──▶ Idle
///   ▲                     │                                      │
///   └──────open failed────┘          identity change ────────────┴──▶ Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No watch, no identity, nothing pending.
    #[default]
    Idle,
    /// An open request is in flight.
    Connecting,
    /// The watch is live and has subscribers.
    Active,
    /// Grace window running on a live watch, or a close in flight.
    TearingDown,
}

/// Lifetime counters for one coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConnectionStats {
    /// Connect tasks started.
    pub connect_attempts: u64,
    /// Opens acknowledged by the feed.
    pub opens_succeeded: u64,
    /// Opens rejected by the feed.
    pub opens_failed: u64,
    /// Closes that ran to completion.
    pub closes_completed: u64,
    /// Live watches the backend reported dead.
    pub watches_lost: u64,
}

/// Point-in-time view of a coordinator, safe to expose over HTTP.
///
/// The bound identity itself is never included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CoordinatorStatus {
    /// Watched resource key.
    pub resource: String,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Live subscriber count.
    pub subscribers: usize,
    /// Whether an identity is bound.
    pub identity_bound: bool,
    /// Whether an open request is in flight.
    pub open_in_progress: bool,
    /// Whether a grace-window teardown is scheduled.
    pub teardown_pending: bool,
    /// Id of the live upstream watch.
    pub watch_id: Option<String>,
    /// When the live watch was acknowledged.
    pub connected_since: Option<DateTime<Utc>>,
    /// Lifetime counters.
    pub stats: ConnectionStats,
    /// Most recent open failure or lost watch, cleared by the next
    /// successful open.
    pub last_error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_snake_case() {
        let Ok(json) = serde_json::to_string(&Phase::TearingDown) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"tearing_down\"");
        assert_eq!(Phase::default(), Phase::Idle);
    }
}

//! Change notifications relayed from an upstream feed.
//!
//! A [`ChangeEvent`] says "something in this resource changed". The hub
//! carries the upstream payload through untouched; listeners are expected
//! to re-read their own data rather than trust the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceKey;

/// A single change notification for a watched resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Resource the change happened in.
    pub resource: ResourceKey,
    /// Upstream payload, never interpreted by the hub.
    pub payload: serde_json::Value,
    /// When the hub received the notification.
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(resource: ResourceKey, payload: serde_json::Value) -> Self {
        Self {
            resource,
            payload,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serializes_resource_as_plain_string() {
        let Ok(resource) = ResourceKey::new("tasks") else {
            panic!("valid key");
        };
        let event = ChangeEvent::new(resource, serde_json::json!({"op": "UPDATE"}));
        let Ok(value) = serde_json::to_value(&event) else {
            panic!("serialization failed");
        };
        assert_eq!(value["resource"], "tasks");
        assert_eq!(value["payload"]["op"], "UPDATE");
        assert!(value["received_at"].is_string());
    }
}

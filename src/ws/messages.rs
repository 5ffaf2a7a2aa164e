//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Server → client reply to the command with the given `id`.
    #[must_use]
    pub fn response(id: String, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Server → client change notification.
    #[must_use]
    pub fn event(payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Event,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Server → client error for the command with the given `id`.
    #[must_use]
    pub fn error(id: String, code: u32, message: &str) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "code": code,
                "message": message,
            }),
        }
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client change event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Start receiving change events for the given resources.
    Subscribe {
        /// Opaque identity that owns the upstream watch.
        identity: String,
        /// Resource keys to watch.
        resources: Vec<String>,
    },
    /// Stop receiving change events for the given resources.
    Unsubscribe {
        /// Resource keys to release.
        resources: Vec<String>,
    },
    /// Get the coordinator status for one resource.
    Status {
        /// Resource key.
        resource: String,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe_command() {
        let payload = serde_json::json!({
            "command": "subscribe",
            "identity": "user-1",
            "resources": ["tasks", "clients"],
        });
        let Ok(WsCommand::Subscribe {
            identity,
            resources,
        }) = serde_json::from_value::<WsCommand>(payload)
        else {
            panic!("expected subscribe command");
        };
        assert_eq!(identity, "user-1");
        assert_eq!(resources, vec!["tasks", "clients"]);
    }

    #[test]
    fn rejects_unknown_command() {
        let payload = serde_json::json!({"command": "swap", "resources": []});
        assert!(serde_json::from_value::<WsCommand>(payload).is_err());
    }

    #[test]
    fn envelope_uses_type_field() {
        let msg = WsMessage::error("7".to_string(), 404, "unknown command");
        let Ok(value) = serde_json::to_value(&msg) else {
            panic!("serialization failed");
        };
        assert_eq!(value["type"], "error");
        assert_eq!(value["id"], "7");
        assert_eq!(value["payload"]["code"], 404);
    }
}

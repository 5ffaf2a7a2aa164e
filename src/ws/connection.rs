//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding change events for the
//! resources the client subscribed to.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::messages::{WsCommand, WsMessage};
use super::subscription::SubscriptionManager;
use crate::app_state::AppState;
use crate::domain::{ChangeEvent, Identity, ResourceKey};
use crate::error::HubError;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards change events from subscribed resources to the client.
///
/// Every subscription is released when the loop ends, whichever side
/// closed the socket.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (events_tx, mut events_rx) = mpsc::channel::<ChangeEvent>(state.bus.capacity());
    let mut subs = SubscriptionManager::new(events_tx);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &state, &mut subs);
                        if let Some(json) = reply
                            && ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            Some(event) = events_rx.recv() => {
                let payload = serde_json::to_value(&event).unwrap_or_default();
                let json = serde_json::to_string(&WsMessage::event(payload)).unwrap_or_default();
                if ws_tx.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
        }
    }

    subs.release_all(&state.registry);
    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON reply.
fn handle_text_message(
    text: &str,
    state: &AppState,
    subs: &mut SubscriptionManager,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        let err = WsMessage::error(String::new(), 400, "malformed JSON");
        return serde_json::to_string(&err).ok();
    };

    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        let err = WsMessage::error(msg.id, 404, "unknown command");
        return serde_json::to_string(&err).ok();
    };

    let reply = match dispatch(command, state, subs) {
        Ok(payload) => WsMessage::response(msg.id, payload),
        Err(e) => WsMessage::error(msg.id, e.error_code(), &e.to_string()),
    };
    serde_json::to_string(&reply).ok()
}

fn dispatch(
    command: WsCommand,
    state: &AppState,
    subs: &mut SubscriptionManager,
) -> Result<serde_json::Value, HubError> {
    match command {
        WsCommand::Subscribe {
            identity,
            resources,
        } => {
            let identity = Identity::new(identity)?;
            let resources = parse_keys(&resources)?;
            let added = subs.subscribe(&state.registry, &state.bus, identity, &resources)?;
            Ok(serde_json::json!({
                "subscribed": added,
                "count": subs.count(),
            }))
        }
        WsCommand::Unsubscribe { resources } => {
            let resources = parse_keys(&resources)?;
            let removed = subs.unsubscribe(&state.registry, &resources);
            Ok(serde_json::json!({
                "unsubscribed": removed,
                "remaining_count": subs.count(),
            }))
        }
        WsCommand::Status { resource } => {
            let resource = ResourceKey::new(&resource)?;
            let status = state.registry.get(&resource)?.status();
            serde_json::to_value(status).map_err(|e| HubError::Internal(e.to_string()))
        }
    }
}

fn parse_keys(raw: &[String]) -> Result<Vec<ResourceKey>, HubError> {
    raw.iter().map(ResourceKey::new).collect()
}

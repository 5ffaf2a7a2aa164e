//! PostgreSQL `LISTEN/NOTIFY` change feed.
//!
//! Each watch holds a dedicated [`PgListener`] subscribed to the channel
//! `"{resource}:{identity}"`. Rows are announced by the
//! `notify_row_change()` trigger function installed by the bundled
//! migration, e.g.
//!
//! ```sql
//! CREATE TRIGGER tasks_notify AFTER INSERT OR UPDATE OR DELETE ON tasks
//!     FOR EACH ROW EXECUTE FUNCTION notify_row_change('tasks', 'owner_id');
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::task::JoinHandle;

use super::{ChangeFeed, EventSink, WatchHandle};
use crate::domain::{ChangeEvent, Identity, ResourceKey, WatchId};
use crate::error::HubError;

/// Postgres refuses channel names of 64 bytes or more.
const MAX_CHANNEL_LEN: usize = 63;

/// Change feed backed by Postgres notifications.
#[derive(Debug, Clone)]
pub struct PgChangeFeed {
    pool: PgPool,
    listeners: Arc<Mutex<HashMap<WatchId, JoinHandle<()>>>>,
}

impl PgChangeFeed {
    /// Creates a feed that draws listener connections from `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the notification channel for a watch.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::OpenRejected`] if the channel name would exceed
    /// the Postgres identifier limit.
    pub fn channel_name(resource: &ResourceKey, identity: &Identity) -> Result<String, HubError> {
        let channel = format!("{resource}:{identity}");
        if channel.len() > MAX_CHANNEL_LEN {
            return Err(HubError::OpenRejected {
                resource: resource.to_string(),
                reason: format!("channel name exceeds {MAX_CHANNEL_LEN} bytes"),
            });
        }
        Ok(channel)
    }
}

/// Parses a notification payload as JSON, keeping it as a string otherwise.
fn parse_payload(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn open_watch(
        &self,
        resource: &ResourceKey,
        identity: &Identity,
        sink: EventSink,
    ) -> Result<WatchHandle, HubError> {
        let channel = Self::channel_name(resource, identity)?;

        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener
            .listen(&channel)
            .await
            .map_err(|e| HubError::OpenRejected {
                resource: resource.to_string(),
                reason: e.to_string(),
            })?;

        let handle = WatchHandle::new();
        let watch_id = handle.id();
        let resource = resource.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        sink.deliver(ChangeEvent::new(
                            resource.clone(),
                            parse_payload(notification.payload()),
                        ));
                    }
                    Err(err) => {
                        tracing::error!(
                            %resource,
                            %watch_id,
                            error = %err,
                            "postgres listener failed; real-time updates unavailable"
                        );
                        sink.fail(HubError::from(err));
                        break;
                    }
                }
            }
        });
        self.listeners.lock().insert(watch_id, task);
        tracing::debug!(%channel, %watch_id, "listening for postgres notifications");
        Ok(handle)
    }

    async fn close_watch(&self, handle: &WatchHandle) {
        let task = self.listeners.lock().remove(&handle.id());
        if let Some(task) = task {
            task.abort();
        }
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn channel_combines_resource_and_identity() {
        let (Ok(resource), Ok(identity)) = (ResourceKey::new("tasks"), Identity::new("u-17"))
        else {
            panic!("valid inputs");
        };
        let Ok(channel) = PgChangeFeed::channel_name(&resource, &identity) else {
            panic!("channel should fit");
        };
        assert_eq!(channel, "tasks:u-17");
    }

    #[test]
    fn overlong_channel_is_rejected() {
        let (Ok(resource), Ok(identity)) = (
            ResourceKey::new("team_members"),
            Identity::new("0f8fad5b-d9cb-469f-a165-70867728950e-0f8fad5b-d9cb-469f"),
        ) else {
            panic!("valid inputs");
        };
        assert!(matches!(
            PgChangeFeed::channel_name(&resource, &identity),
            Err(HubError::OpenRejected { .. })
        ));
    }

    #[test]
    fn payload_falls_back_to_string() {
        assert_eq!(
            parse_payload(r#"{"op":"DELETE"}"#),
            serde_json::json!({"op": "DELETE"})
        );
        assert_eq!(parse_payload("row 7 changed"), serde_json::json!("row 7 changed"));
    }
}

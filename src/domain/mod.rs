//! Domain layer: identities, resource keys, change events and the bus.
//!
//! These are the value types shared by the coordinator, the upstream
//! change feeds, and the HTTP/WebSocket surface, plus the
//! [`NotificationBus`] that feature modules listen on.

pub mod change_event;
pub mod identity;
pub mod notification_bus;
pub mod resource_key;
pub mod watch_id;

pub use change_event::ChangeEvent;
pub use identity::Identity;
pub use notification_bus::{ChangeListener, NotificationBus};
pub use resource_key::ResourceKey;
pub use watch_id::WatchId;

//! Upstream layer: the change-feed capability and its backends.
//!
//! The coordinator talks to a backend only through [`ChangeFeed`] and
//! wraps each open watch in an [`UpstreamConnection`].

pub mod connection;
pub mod feed;
pub mod memory;
pub mod postgres;

pub use connection::UpstreamConnection;
pub use feed::{ChangeFeed, EventSink, WatchHandle};
pub use memory::InMemoryChangeFeed;
pub use postgres::PgChangeFeed;

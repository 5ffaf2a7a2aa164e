//! Type-safe identifier for an upstream watch.
//!
//! [`WatchId`] is a newtype wrapper around [`uuid::Uuid`] (v4). Every
//! successful open on a change feed yields a fresh id, so a stale handle
//! can never be confused with the watch that replaced it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for one upstream watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchId(uuid::Uuid);

impl WatchId {
    /// Creates a new random `WatchId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(WatchId::new(), WatchId::new());
    }

    #[test]
    fn display_is_uuid_format() {
        let id = WatchId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
        assert_eq!(s, id.as_uuid().to_string());
    }
}

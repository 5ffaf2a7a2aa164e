//! Type-safe resource key.
//!
//! A [`ResourceKey`] names a watched resource (a backend table such as
//! `tasks` or `clients`). It is the coordinator's identity, the upstream
//! channel prefix, and the notification bus routing key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Maximum key length; Postgres truncates channel identifiers at 63 bytes.
pub const MAX_RESOURCE_KEY_LEN: usize = 63;

/// Name of a watched resource.
///
/// Accepts ASCII letters, digits, `_`, `-` and `.`; stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Creates a validated resource key.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidResourceKey`] if the key is empty, too
    /// long, or contains characters outside `[A-Za-z0-9_.-]`.
    pub fn new(value: impl AsRef<str>) -> Result<Self, HubError> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return Err(HubError::InvalidResourceKey(
                "resource key must not be empty".to_string(),
            ));
        }
        if value.len() > MAX_RESOURCE_KEY_LEN {
            return Err(HubError::InvalidResourceKey(format!(
                "{value} exceeds {MAX_RESOURCE_KEY_LEN} bytes"
            )));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
        {
            return Err(HubError::InvalidResourceKey(format!(
                "{value} contains unsupported character {bad:?}"
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceKey> for String {
    fn from(value: ResourceKey) -> Self {
        value.0
    }
}

impl FromStr for ResourceKey {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case() {
        let Ok(key) = ResourceKey::new("Tasks") else {
            panic!("valid key");
        };
        assert_eq!(key.as_str(), "tasks");
    }

    #[test]
    fn accepts_schema_qualified_names() {
        assert!(ResourceKey::new("public.team_members").is_ok());
    }

    #[test]
    fn rejects_empty_and_punctuation() {
        assert!(ResourceKey::new("").is_err());
        assert!(ResourceKey::new("tasks;drop").is_err());
        assert!(ResourceKey::new("with space").is_err());
    }

    #[test]
    fn rejects_keys_longer_than_channel_limit() {
        let long = "a".repeat(MAX_RESOURCE_KEY_LEN + 1);
        assert!(matches!(
            ResourceKey::new(long),
            Err(HubError::InvalidResourceKey(_))
        ));
    }

    #[test]
    fn orders_lexicographically() {
        let (Ok(a), Ok(b)) = (ResourceKey::new("clients"), ResourceKey::new("tasks")) else {
            panic!("valid keys");
        };
        assert!(a < b);
    }

    #[test]
    fn deserialization_applies_validation() {
        let Ok(key) = serde_json::from_str::<ResourceKey>("\"Clients\"") else {
            panic!("valid key");
        };
        assert_eq!(key.as_str(), "clients");
        assert!(serde_json::from_str::<ResourceKey>("\"tasks;drop\"").is_err());
        assert_eq!(serde_json::to_string(&key).ok().as_deref(), Some("\"clients\""));
    }
}

//! Opaque owner identity for upstream watches.
//!
//! An [`Identity`] names the owner of a watch (typically the signed-in
//! user). The hub never interprets it; it only compares identities for
//! equality to decide whether the live watch can be reused.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Maximum accepted identity length in bytes.
pub const MAX_IDENTITY_LEN: usize = 256;

/// Opaque token identifying the owner of an upstream watch.
///
/// Immutable once constructed. Surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from an opaque token.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidIdentity`] if the token is blank or
    /// longer than [`MAX_IDENTITY_LEN`] bytes.
    pub fn new(value: impl Into<String>) -> Result<Self, HubError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(HubError::InvalidIdentity(
                "identity must not be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_IDENTITY_LEN {
            return Err(HubError::InvalidIdentity(format!(
                "identity exceeds {MAX_IDENTITY_LEN} bytes"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl FromStr for Identity {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

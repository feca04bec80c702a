//! Identifier wrappers.
//!
//! An [`Identity`] is the display name the status source reports for a
//! participant. It is opaque: two identities are the same participant if and
//! only if their strings are equal. A [`JoinEventId`] tags a single emitted
//! join notification so log lines from the engine and the sink can be
//! correlated.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, opaque participant identity (the in-game display name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the underlying name.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for one emitted join notification (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JoinEventId(pub Uuid);

impl JoinEventId {
    /// Create a new identifier using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JoinEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for JoinEventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

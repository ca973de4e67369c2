//! Type-safe identifier newtypes for certwarden.
//!
//! These types provide compile-time safety for identifiers, preventing
//! accidental mixing of certificate names, instance row ids and pass ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of a managed certificate.
///
/// One certificate record exists per managed name; all of its issued
/// key/certificate pairs hang off this name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertName(String);

impl CertName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CertName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CertName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Row id of a certificate instance.
///
/// Ids are assigned monotonically at creation, so a higher id always
/// denotes a more recent instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id following this one
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Unique id of one scheduling pass.
///
/// Attached to the pass span so every log line emitted while evaluating
/// the fleet can be correlated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassId(String);

impl PassId {
    /// Create a new random pass ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Closed vocabularies shared by the store, the configuration and the
//! scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing one of the enums in this module fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

/// What a certificate is issued for.
///
/// CA certificates are bootstrapped through a separate path and are never
/// touched by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    #[default]
    Leaf,
    #[serde(rename = "CA")]
    Ca,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Leaf => "leaf",
            SubjectType::Ca => "CA",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leaf" | "server" | "client" => Ok(SubjectType::Leaf),
            "ca" => Ok(SubjectType::Ca),
            _ => Err(ParseEnumError::new("subject type", s, "leaf, CA")),
        }
    }
}

/// Who issues a certificate.
///
/// ACME certificates are renewed automatically and get their TLSA
/// fingerprints prepublished; local certificates are issued by a human and
/// only produce reminder mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertType {
    Local,
    #[default]
    Acme,
}

impl CertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertType::Local => "local",
            CertType::Acme => "acme",
        }
    }
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(CertType::Local),
            "acme" | "le" => Ok(CertType::Acme),
            _ => Err(ParseEnumError::new("certificate type", s, "local, acme")),
        }
    }
}

/// Lifecycle state of one certificate instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Placeholder row that never became a certificate
    Reserved,
    /// Freshly issued, not serving traffic yet
    Issued,
    /// Fingerprint published in DNS next to the serving one
    Prepublished,
    /// Pushed to and served by the deployment targets
    Deployed,
    /// Past validity plus grace, no longer trusted
    Expired,
    /// Retained for audit only
    Archived,
}

impl InstanceState {
    /// States that keep exactly one survivor during retention, in the
    /// order retention walks them.
    pub const RETAINED: [InstanceState; 4] = [
        InstanceState::Issued,
        InstanceState::Prepublished,
        InstanceState::Deployed,
        InstanceState::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Reserved => "reserved",
            InstanceState::Issued => "issued",
            InstanceState::Prepublished => "prepublished",
            InstanceState::Deployed => "deployed",
            InstanceState::Expired => "expired",
            InstanceState::Archived => "archived",
        }
    }

    /// Whether instances in this state are always garbage
    pub fn is_garbage(&self) -> bool {
        matches!(self, InstanceState::Reserved | InstanceState::Archived)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reserved" => Ok(InstanceState::Reserved),
            "issued" => Ok(InstanceState::Issued),
            "prepublished" => Ok(InstanceState::Prepublished),
            "deployed" => Ok(InstanceState::Deployed),
            "expired" => Ok(InstanceState::Expired),
            "archived" => Ok(InstanceState::Archived),
            _ => Err(ParseEnumError::new(
                "instance state",
                s,
                "reserved, issued, prepublished, deployed, expired, archived",
            )),
        }
    }
}

/// Whether actions are performed or only previewed.
///
/// In preview mode every mutating step logs what it would do and returns
/// without touching the store or any external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Live,
    Preview,
}

impl ExecutionMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ExecutionMode::Preview
        } else {
            ExecutionMode::Live
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, ExecutionMode::Preview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Live => "live",
            ExecutionMode::Preview => "preview",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_state_roundtrip_names() {
        for state in [
            InstanceState::Reserved,
            InstanceState::Issued,
            InstanceState::Prepublished,
            InstanceState::Deployed,
            InstanceState::Expired,
            InstanceState::Archived,
        ] {
            assert_eq!(state.as_str().parse::<InstanceState>().unwrap(), state);
        }
    }

    #[test]
    fn test_garbage_states() {
        assert!(InstanceState::Reserved.is_garbage());
        assert!(InstanceState::Archived.is_garbage());
        assert!(!InstanceState::Deployed.is_garbage());
        assert!(!InstanceState::Expired.is_garbage());
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "revoked".parse::<InstanceState>().unwrap_err();
        assert!(err.to_string().contains("revoked"));
        assert!("letsencrypt".parse::<CertType>().is_err());
    }

    #[test]
    fn test_subject_type_serde() {
        let json = serde_json::to_string(&SubjectType::Ca).unwrap();
        assert_eq!(json, "\"CA\"");
        let parsed: SubjectType = serde_json::from_str("\"leaf\"").unwrap();
        assert_eq!(parsed, SubjectType::Leaf);
    }

    #[test]
    fn test_execution_mode() {
        assert!(ExecutionMode::from_dry_run(true).is_preview());
        assert!(!ExecutionMode::from_dry_run(false).is_preview());
        assert_eq!(ExecutionMode::default(), ExecutionMode::Live);
    }
}

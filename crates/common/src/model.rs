//! Certificate and certificate instance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{CertName, InstanceId};
use crate::types::{CertType, InstanceState, SubjectType};

/// A managed certificate: one per name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub name: CertName,
    #[serde(default)]
    pub subject_type: SubjectType,
    #[serde(default)]
    pub cert_type: CertType,
    /// Suppresses issuance and distribution, bookkeeping still runs
    #[serde(default)]
    pub disabled: bool,
    /// Set once a renewal reminder went out; cleared by a human
    #[serde(default)]
    pub authorized_until: Option<DateTime<Utc>>,
}

impl Certificate {
    /// Create an enabled leaf certificate of the given type
    pub fn new(name: impl Into<CertName>, cert_type: CertType) -> Self {
        Self {
            name: name.into(),
            subject_type: SubjectType::Leaf,
            cert_type,
            disabled: false,
            authorized_until: None,
        }
    }

    pub fn is_ca(&self) -> bool {
        self.subject_type == SubjectType::Ca
    }

    pub fn is_local(&self) -> bool {
        self.cert_type == CertType::Local
    }
}

/// One concrete issued key/certificate pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertInstance {
    pub id: InstanceId,
    pub state: InstanceState,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// PEM certificate, when the issuer handed one over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_pem: Option<String>,
}

impl fmt::Display for CertInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{} .. {}]",
            self.id,
            self.state,
            self.not_before.format("%Y-%m-%d %H:%M"),
            self.not_after.format("%Y-%m-%d %H:%M"),
        )
    }
}

/// Fields of an instance that does not have an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstance {
    pub state: InstanceState,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    #[serde(default)]
    pub cert_pem: Option<String>,
}

impl NewInstance {
    pub fn into_instance(self, id: InstanceId) -> CertInstance {
        CertInstance {
            id,
            state: self.state,
            not_before: self.not_before,
            not_after: self.not_after,
            cert_pem: self.cert_pem,
        }
    }
}

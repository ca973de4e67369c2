//! Collaborators the scheduler drives.
//!
//! The scheduler decides; these traits carry out the side effects. Every
//! call reports failure through [`CollaboratorError`], which the scheduler
//! treats as terminal for the current certificate's pass.
//!
//! Hook-based implementations run configured shell commands:
//!
//! - [`HookIssuer`] - issues ACME certificates, skips local ones
//! - [`HookDistributor`] - pushes certificate material to the targets
//! - [`HookDnsPublisher`] - publishes TLSA records for two certificates
//! - [`CommandMailer`] - hands reminder mail to a sendmail-style command

mod hooks;
mod mail;
pub mod tlsa;

pub use hooks::{HookCommand, HookDistributor, HookDnsPublisher, HookIssuer};
pub use mail::CommandMailer;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use certwarden_common::{CertInstance, Certificate, InstanceState};

use crate::clock::Clock;
use crate::error::CollaboratorError;
use crate::store::InstanceStore;

/// Obtains new certificate instances.
#[async_trait]
pub trait Issuer: Send + Sync {
    /// Issue a new instance and persist it in state `issued`.
    ///
    /// Returns `None` for local certificates, whose issuance is a human
    /// action outside the scheduler.
    async fn issue(&self, certificate: &Certificate)
        -> Result<Option<CertInstance>, CollaboratorError>;
}

/// Pushes certificate material to the deployment targets.
#[async_trait]
pub trait Distributor: Send + Sync {
    /// Deploy `instance`, which must currently be in one of
    /// `allowed_prior_states`.
    async fn deploy(
        &self,
        certificate: &Certificate,
        instance: &CertInstance,
        allowed_prior_states: &[InstanceState],
    ) -> Result<(), CollaboratorError>;
}

/// Computes and publishes DNS trust fingerprints.
#[async_trait]
pub trait DnsPublisher: Send + Sync {
    fn fingerprint(&self, instance: &CertInstance) -> Result<Fingerprint, CollaboratorError>;

    /// Publish both fingerprints as parallel records, so validators
    /// pinned to either succeed.
    async fn publish_dual(
        &self,
        certificate: &Certificate,
        active: &Fingerprint,
        candidate: &Fingerprint,
    ) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), CollaboratorError>;
}

/// Opaque hash pinning a certificate in DNS
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: String,
}

/// Everything one scheduling pass talks to
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn InstanceStore>,
    pub issuer: Arc<dyn Issuer>,
    pub distributor: Arc<dyn Distributor>,
    pub dns: Arc<dyn DnsPublisher>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

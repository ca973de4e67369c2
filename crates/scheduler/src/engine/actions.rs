//! Side-effecting steps of a rollover.
//!
//! Every step checks the execution mode first; in preview it only logs what
//! it would do.

use tracing::{debug, info};

use certwarden_common::{CertInstance, Certificate, ExecutionMode, InstanceState};

use crate::collab::Collaborators;
use crate::error::ScheduleError;

/// Prior states a replacement may be distributed from
const DISTRIBUTABLE: [InstanceState; 2] = [InstanceState::Issued, InstanceState::Prepublished];

/// Result of asking for a new instance
#[derive(Debug)]
pub(crate) enum IssueOutcome {
    Issued(CertInstance),
    /// Preview mode: an instance would have been requested
    Previewed,
    /// The issuer does not issue this certificate
    NotApplicable,
}

/// Action executor for one pass
pub(crate) struct Actions<'a> {
    collab: &'a Collaborators,
    mode: ExecutionMode,
}

impl<'a> Actions<'a> {
    pub(crate) fn new(collab: &'a Collaborators, mode: ExecutionMode) -> Self {
        Self { collab, mode }
    }

    pub(crate) fn collab(&self) -> &'a Collaborators {
        self.collab
    }

    pub(crate) async fn issue(&self, cert: &Certificate) -> Result<IssueOutcome, ScheduleError> {
        if cert.is_local() {
            debug!(cert = %cert.name, "Local certificate, nothing to issue");
            return Ok(IssueOutcome::NotApplicable);
        }
        if self.mode.is_preview() {
            debug!(cert = %cert.name, "Would issue");
            return Ok(IssueOutcome::Previewed);
        }

        info!(cert = %cert.name, "Requesting issue");
        match self.collab.issuer.issue(cert).await {
            Ok(Some(instance)) => Ok(IssueOutcome::Issued(instance)),
            Ok(None) => Ok(IssueOutcome::NotApplicable),
            Err(e) => Err(ScheduleError::Issue(e)),
        }
    }

    /// Deploy `instance` and record it as `deployed`
    pub(crate) async fn distribute(
        &self,
        cert: &Certificate,
        instance: &CertInstance,
    ) -> Result<(), ScheduleError> {
        if self.mode.is_preview() {
            debug!(cert = %cert.name, instance = %instance.id, "Would distribute");
            return Ok(());
        }

        info!(cert = %cert.name, instance = %instance.id, state = %instance.state, "Distributing");
        self.collab
            .distributor
            .deploy(cert, instance, &DISTRIBUTABLE)
            .await
            .map_err(|source| ScheduleError::Distribute {
                instance: instance.id,
                source,
            })?;

        self.transition(cert, instance, InstanceState::Deployed).await
    }

    /// Publish the fingerprints of `active` and `candidate` side by side,
    /// then record the candidate as `prepublished`
    pub(crate) async fn prepublish(
        &self,
        cert: &Certificate,
        active: &CertInstance,
        candidate: &CertInstance,
    ) -> Result<(), ScheduleError> {
        if self.mode.is_preview() {
            debug!(
                cert = %cert.name,
                active = %active.id,
                candidate = %candidate.id,
                "Would prepublish"
            );
            return Ok(());
        }

        let dns = &self.collab.dns;
        let prepublish_error = |source| ScheduleError::Prepublish {
            instance: candidate.id,
            source,
        };

        let active_fp = dns.fingerprint(active).map_err(prepublish_error)?;
        let candidate_fp = dns.fingerprint(candidate).map_err(prepublish_error)?;

        info!(
            cert = %cert.name,
            active = %active.id,
            candidate = %candidate.id,
            "Prepublishing"
        );
        dns.publish_dual(cert, &active_fp, &candidate_fp)
            .await
            .map_err(prepublish_error)?;

        self.transition(cert, candidate, InstanceState::Prepublished)
            .await
    }

    pub(crate) async fn expire(
        &self,
        cert: &Certificate,
        instance: &CertInstance,
    ) -> Result<(), ScheduleError> {
        if self.mode.is_preview() {
            debug!(cert = %cert.name, instance = %instance.id, "Would expire");
            return Ok(());
        }
        self.transition(cert, instance, InstanceState::Expired).await
    }

    pub(crate) async fn archive(
        &self,
        cert: &Certificate,
        instance: &CertInstance,
    ) -> Result<(), ScheduleError> {
        if self.mode.is_preview() {
            debug!(cert = %cert.name, instance = %instance.id, "Would archive");
            return Ok(());
        }
        self.transition(cert, instance, InstanceState::Archived).await
    }

    async fn transition(
        &self,
        cert: &Certificate,
        instance: &CertInstance,
        state: InstanceState,
    ) -> Result<(), ScheduleError> {
        info!(
            cert = %cert.name,
            instance = %instance.id,
            from = %instance.state,
            to = %state,
            "State transition"
        );
        let mut updated = instance.clone();
        updated.state = state;
        self.collab.store.save_instance(&updated).await?;
        Ok(())
    }
}

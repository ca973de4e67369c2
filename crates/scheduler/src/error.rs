//! Error types for the scheduler and its collaborators.

use chrono::{DateTime, Utc};
use thiserror::Error;

use certwarden_common::{CertName, InstanceId, InstanceState};

/// Errors raised by an [`InstanceStore`](crate::store::InstanceStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown certificate: {0}")]
    UnknownCertificate(CertName),

    #[error("certificate already exists: {0}")]
    DuplicateCertificate(CertName),

    #[error("unknown certificate instance: {0}")]
    UnknownInstance(InstanceId),
}

/// Errors reported by issuance, distribution, DNS and mail collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// No command configured for this hook.
    #[error("{0} hook is not configured")]
    NotConfigured(&'static str),

    #[error("failed to run {hook} hook '{command}': {source}")]
    Spawn {
        hook: &'static str,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{hook} hook '{command}' exited with {status}: {stderr}")]
    Exit {
        hook: &'static str,
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{hook} hook '{command}' timed out after {secs}s")]
    Timeout {
        hook: &'static str,
        command: String,
        secs: u64,
    },

    #[error("malformed {hook} hook output: {message}")]
    MalformedOutput { hook: &'static str, message: String },

    #[error("instance {0} carries no certificate material")]
    MissingMaterial(InstanceId),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("instance {instance} is {state}, allowed prior states: {allowed}")]
    DisallowedState {
        instance: InstanceId,
        state: InstanceState,
        allowed: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that end the evaluation of a single certificate.
///
/// None of these abort a scheduling pass; the pass logs them and moves on
/// to the next certificate.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("issuance failed: {0}")]
    Issue(#[source] CollaboratorError),

    #[error("distribution of instance {instance} failed: {source}")]
    Distribute {
        instance: InstanceId,
        #[source]
        source: CollaboratorError,
    },

    #[error("prepublishing instance {instance} failed: {source}")]
    Prepublish {
        instance: InstanceId,
        #[source]
        source: CollaboratorError,
    },

    #[error("sending reminder mail failed: {0}")]
    Mail(#[source] CollaboratorError),

    #[error("instance {instance} in unexpected state {state} after classification")]
    InvariantViolation {
        instance: InstanceId,
        state: InstanceState,
    },

    /// Validity plus a scheduling offset leaves the representable range.
    #[error("instance {instance} not_after {not_after} is out of schedulable range")]
    DateOutOfRange {
        instance: InstanceId,
        not_after: DateTime<Utc>,
    },

    #[error("failed to issue an instance for prepublishing")]
    NoPrepublishCandidate,
}

impl ScheduleError {
    /// Whether this error signals corrupted lifecycle data rather than a
    /// failed side effect
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ScheduleError::InvariantViolation { .. })
    }
}

//! Shell hook collaborators.
//!
//! Each hook is a command line run through `sh -c`. Context is passed in
//! `CERTWARDEN_*` environment variables; certificate material, when there
//! is any, is written to the hook's stdin. A hook succeeds when it exits
//! with status zero within the configured timeout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use certwarden_common::{CertInstance, Certificate, InstanceState, NewInstance};

use super::tlsa;
use super::{Distributor, DnsPublisher, Fingerprint, Issuer};
use crate::error::CollaboratorError;
use crate::store::InstanceStore;

pub const ENV_CERT: &str = "CERTWARDEN_CERT";
pub const ENV_CERT_TYPE: &str = "CERTWARDEN_CERT_TYPE";
pub const ENV_INSTANCE: &str = "CERTWARDEN_INSTANCE";
pub const ENV_PRIOR_STATE: &str = "CERTWARDEN_PRIOR_STATE";
pub const ENV_TLSA_ACTIVE: &str = "CERTWARDEN_TLSA_ACTIVE";
pub const ENV_TLSA_CANDIDATE: &str = "CERTWARDEN_TLSA_CANDIDATE";

/// A configured shell command
#[derive(Debug, Clone)]
pub struct HookCommand {
    /// Hook name used in logs and errors
    name: &'static str,
    command: String,
    timeout: Duration,
}

impl HookCommand {
    pub fn new(name: &'static str, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name,
            command: command.into(),
            timeout,
        }
    }

    /// Build a hook from an optional configured command
    pub fn from_config(name: &'static str, command: Option<&str>, timeout: Duration) -> Option<Self> {
        command.map(|c| Self::new(name, c, timeout))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the command and return its stdout
    pub async fn run(
        &self,
        env: &[(&str, String)],
        stdin: Option<&[u8]>,
    ) -> Result<String, CollaboratorError> {
        let start = Instant::now();
        trace!(hook = self.name, command = %self.command, "Running hook");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .envs(env.iter().map(|(key, value)| (*key, value.as_str())))
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| self.spawn_error(source))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // Hooks that do not read their input close the pipe early
            if let Err(e) = pipe.write_all(input).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(self.spawn_error(e));
                }
            }
            drop(pipe);
        }

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| self.spawn_error(source))?,
            Err(_) => {
                return Err(CollaboratorError::Timeout {
                    hook: self.name,
                    command: self.command.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let elapsed_ms = start.elapsed().as_millis();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                hook = self.name,
                status = %output.status,
                elapsed_ms = elapsed_ms,
                "Hook failed"
            );
            return Err(CollaboratorError::Exit {
                hook: self.name,
                command: self.command.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }

        debug!(hook = self.name, elapsed_ms = elapsed_ms, "Hook completed");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, source: std::io::Error) -> CollaboratorError {
        CollaboratorError::Spawn {
            hook: self.name,
            command: self.command.clone(),
            source,
        }
    }
}

/// What the issue hook prints on stdout
///
/// Validity may be omitted when the certificate itself is included; it is
/// then read from the certificate.
#[derive(Debug, Deserialize)]
struct IssuedMaterial {
    #[serde(default)]
    not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    not_after: Option<DateTime<Utc>>,
    #[serde(default)]
    cert_pem: Option<String>,
}

impl IssuedMaterial {
    fn into_new_instance(self) -> Result<NewInstance, CollaboratorError> {
        let (not_before, not_after) = match (self.not_before, self.not_after, &self.cert_pem) {
            (Some(not_before), Some(not_after), _) => (not_before, not_after),
            (_, _, Some(pem)) => tlsa::validity(pem)?,
            _ => {
                return Err(CollaboratorError::MalformedOutput {
                    hook: "issue",
                    message: "neither validity nor cert_pem given".to_string(),
                });
            }
        };

        Ok(NewInstance {
            state: InstanceState::Issued,
            not_before,
            not_after,
            cert_pem: self.cert_pem,
        })
    }
}

/// Issues ACME certificates through the issue hook
///
/// The hook prints a JSON object `{"not_before", "not_after", "cert_pem"}`;
/// the new instance is stored in state `issued`.
pub struct HookIssuer {
    hook: Option<HookCommand>,
    store: Arc<dyn InstanceStore>,
}

impl HookIssuer {
    pub fn new(hook: Option<HookCommand>, store: Arc<dyn InstanceStore>) -> Self {
        Self { hook, store }
    }
}

#[async_trait]
impl Issuer for HookIssuer {
    async fn issue(
        &self,
        certificate: &Certificate,
    ) -> Result<Option<CertInstance>, CollaboratorError> {
        if certificate.is_local() {
            debug!(cert = %certificate.name, "Local certificates are not issued by the scheduler");
            return Ok(None);
        }

        let hook = self
            .hook
            .as_ref()
            .ok_or(CollaboratorError::NotConfigured("issue"))?;

        let stdout = hook
            .run(
                &[
                    (ENV_CERT, certificate.name.to_string()),
                    (ENV_CERT_TYPE, certificate.cert_type.to_string()),
                ],
                None,
            )
            .await?;

        let material: IssuedMaterial =
            serde_json::from_str(stdout.trim()).map_err(|e| CollaboratorError::MalformedOutput {
                hook: "issue",
                message: e.to_string(),
            })?;

        let instance = self
            .store
            .insert_instance(&certificate.name, material.into_new_instance()?)
            .await?;

        info!(
            cert = %certificate.name,
            instance = %instance.id,
            not_after = %instance.not_after,
            "Issued new certificate instance"
        );

        Ok(Some(instance))
    }
}

/// Distributes certificates through the deploy hook
///
/// The PEM certificate, if stored, is written to the hook's stdin.
pub struct HookDistributor {
    hook: Option<HookCommand>,
}

impl HookDistributor {
    pub fn new(hook: Option<HookCommand>) -> Self {
        Self { hook }
    }
}

#[async_trait]
impl Distributor for HookDistributor {
    async fn deploy(
        &self,
        certificate: &Certificate,
        instance: &CertInstance,
        allowed_prior_states: &[InstanceState],
    ) -> Result<(), CollaboratorError> {
        if !allowed_prior_states.contains(&instance.state) {
            return Err(CollaboratorError::DisallowedState {
                instance: instance.id,
                state: instance.state,
                allowed: allowed_prior_states
                    .iter()
                    .map(InstanceState::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let hook = self
            .hook
            .as_ref()
            .ok_or(CollaboratorError::NotConfigured("deploy"))?;

        hook.run(
            &[
                (ENV_CERT, certificate.name.to_string()),
                (ENV_CERT_TYPE, certificate.cert_type.to_string()),
                (ENV_INSTANCE, instance.id.get().to_string()),
                (ENV_PRIOR_STATE, instance.state.to_string()),
            ],
            instance.cert_pem.as_deref().map(str::as_bytes),
        )
        .await?;

        Ok(())
    }
}

/// Publishes TLSA `3 1 1` records through the publish-tlsa hook
pub struct HookDnsPublisher {
    hook: Option<HookCommand>,
}

impl HookDnsPublisher {
    pub fn new(hook: Option<HookCommand>) -> Self {
        Self { hook }
    }
}

#[async_trait]
impl DnsPublisher for HookDnsPublisher {
    fn fingerprint(&self, instance: &CertInstance) -> Result<Fingerprint, CollaboratorError> {
        let pem = instance
            .cert_pem
            .as_deref()
            .ok_or(CollaboratorError::MissingMaterial(instance.id))?;
        tlsa::spki_sha256(pem)
    }

    async fn publish_dual(
        &self,
        certificate: &Certificate,
        active: &Fingerprint,
        candidate: &Fingerprint,
    ) -> Result<(), CollaboratorError> {
        let hook = self
            .hook
            .as_ref()
            .ok_or(CollaboratorError::NotConfigured("publish-tlsa"))?;

        hook.run(
            &[
                (ENV_CERT, certificate.name.to_string()),
                (ENV_TLSA_ACTIVE, active.to_string()),
                (ENV_TLSA_CANDIDATE, candidate.to_string()),
            ],
            None,
        )
        .await?;

        Ok(())
    }
}

//! Recording collaborators and a harness for engine tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use certwarden_common::{
    CertInstance, CertName, Certificate, InstanceId, InstanceState, NewInstance,
};

use super::{PassScheduler, SchedulerSettings};
use crate::clock::{Clock, FixedClock};
use crate::collab::{
    Collaborators, Distributor, DnsPublisher, Fingerprint, Issuer, MailMessage, Mailer,
};
use crate::error::CollaboratorError;
use crate::store::{InstanceStore, MemoryStore};

/// Validity of instances minted by [`FakeIssuer`]
pub(crate) fn issued_validity() -> Duration {
    Duration::days(90)
}

fn failure(hook: &'static str) -> CollaboratorError {
    CollaboratorError::Exit {
        hook,
        command: "false".to_string(),
        status: "exit status: 1".to_string(),
        stderr: String::new(),
    }
}

pub(crate) struct FakeIssuer {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    calls: Mutex<Vec<CertName>>,
    failing: Mutex<HashSet<CertName>>,
}

impl FakeIssuer {
    pub(crate) fn calls(&self) -> Vec<CertName> {
        self.calls.lock().clone()
    }

    pub(crate) fn fail_for(&self, name: &str) {
        self.failing.lock().insert(CertName::new(name));
    }
}

#[async_trait]
impl Issuer for FakeIssuer {
    async fn issue(
        &self,
        certificate: &Certificate,
    ) -> Result<Option<CertInstance>, CollaboratorError> {
        self.calls.lock().push(certificate.name.clone());
        if certificate.is_local() {
            return Ok(None);
        }
        if self.failing.lock().contains(&certificate.name) {
            return Err(failure("issue"));
        }

        let now = self.clock.now();
        let instance = self
            .store
            .insert_instance(
                &certificate.name,
                NewInstance {
                    state: InstanceState::Issued,
                    not_before: now,
                    not_after: now + issued_validity(),
                    cert_pem: Some(format!("pem:{}", certificate.name)),
                },
            )
            .await?;
        Ok(Some(instance))
    }
}

#[derive(Default)]
pub(crate) struct FakeDistributor {
    calls: Mutex<Vec<(CertName, InstanceId)>>,
    failing: Mutex<HashSet<CertName>>,
}

impl FakeDistributor {
    pub(crate) fn calls(&self) -> Vec<(CertName, InstanceId)> {
        self.calls.lock().clone()
    }

    pub(crate) fn fail_for(&self, name: &str) {
        self.failing.lock().insert(CertName::new(name));
    }
}

#[async_trait]
impl Distributor for FakeDistributor {
    async fn deploy(
        &self,
        certificate: &Certificate,
        instance: &CertInstance,
        allowed_prior_states: &[InstanceState],
    ) -> Result<(), CollaboratorError> {
        self.calls
            .lock()
            .push((certificate.name.clone(), instance.id));
        assert!(
            allowed_prior_states.contains(&instance.state),
            "distributed instance {} from state {}",
            instance.id,
            instance.state
        );
        if self.failing.lock().contains(&certificate.name) {
            return Err(failure("deploy"));
        }
        Ok(())
    }
}

/// A dual publication as seen by the DNS fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Publication {
    pub cert: CertName,
    pub active: Fingerprint,
    pub candidate: Fingerprint,
}

#[derive(Default)]
pub(crate) struct FakeDns {
    publications: Mutex<Vec<Publication>>,
    fingerprints: Mutex<usize>,
}

impl FakeDns {
    pub(crate) fn publications(&self) -> Vec<Publication> {
        self.publications.lock().clone()
    }

    pub(crate) fn fingerprint_calls(&self) -> usize {
        *self.fingerprints.lock()
    }
}

#[async_trait]
impl DnsPublisher for FakeDns {
    fn fingerprint(&self, instance: &CertInstance) -> Result<Fingerprint, CollaboratorError> {
        *self.fingerprints.lock() += 1;
        Ok(Fingerprint::new(format!("fp{}", instance.id.get())))
    }

    async fn publish_dual(
        &self,
        certificate: &Certificate,
        active: &Fingerprint,
        candidate: &Fingerprint,
    ) -> Result<(), CollaboratorError> {
        self.publications.lock().push(Publication {
            cert: certificate.name.clone(),
            active: active.clone(),
            candidate: candidate.clone(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeMailer {
    sent: Mutex<Vec<MailMessage>>,
    failing: Mutex<bool>,
}

impl FakeMailer {
    pub(crate) fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), CollaboratorError> {
        if *self.failing.lock() {
            return Err(failure("mail"));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// In-memory store, fixed clock and recording collaborators wired together
pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub issuer: Arc<FakeIssuer>,
    pub distributor: Arc<FakeDistributor>,
    pub dns: Arc<FakeDns>,
    pub mailer: Arc<FakeMailer>,
    pub collab: Collaborators,
}

impl Harness {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(now));
        let issuer = Arc::new(FakeIssuer {
            store: store.clone(),
            clock: clock.clone(),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        });
        let distributor = Arc::new(FakeDistributor::default());
        let dns = Arc::new(FakeDns::default());
        let mailer = Arc::new(FakeMailer::default());

        let collab = Collaborators {
            store: store.clone(),
            issuer: issuer.clone(),
            distributor: distributor.clone(),
            dns: dns.clone(),
            mailer: mailer.clone(),
            clock: clock.clone(),
        };

        Self {
            store,
            clock,
            issuer,
            distributor,
            dns,
            mailer,
            collab,
        }
    }

    pub(crate) fn settings() -> SchedulerSettings {
        SchedulerSettings {
            mail_from: "certwarden@example.org".to_string(),
            mail_to: "pki@example.org".to_string(),
            ..SchedulerSettings::default()
        }
    }

    pub(crate) fn scheduler(&self) -> PassScheduler {
        PassScheduler::new(self.collab.clone(), Self::settings())
    }

    pub(crate) async fn add(&self, certificate: Certificate) {
        self.store.add_certificate(certificate).await.unwrap();
    }

    /// Seed an instance valid for 90 days up to `not_after`
    pub(crate) fn seed(&self, name: &str, id: u64, state: InstanceState, not_after: DateTime<Utc>) {
        self.store
            .seed_instance(
                &CertName::new(name),
                CertInstance {
                    id: InstanceId::new(id),
                    state,
                    not_before: not_after - Duration::days(90),
                    not_after,
                    cert_pem: Some(format!("pem:{}:{}", name, id)),
                },
            )
            .unwrap();
    }

    pub(crate) async fn instances(&self, name: &str) -> Vec<CertInstance> {
        self.store.instances_of(&CertName::new(name)).await.unwrap()
    }

    pub(crate) async fn state_of(&self, name: &str, id: u64) -> Option<InstanceState> {
        self.instances(name)
            .await
            .into_iter()
            .find(|instance| instance.id == InstanceId::new(id))
            .map(|instance| instance.state)
    }

    pub(crate) async fn certificate(&self, name: &str) -> Certificate {
        self.store.certificate(&CertName::new(name)).await.unwrap()
    }
}

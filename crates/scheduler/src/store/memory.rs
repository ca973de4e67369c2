//! In-memory instance store.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use certwarden_common::{CertInstance, CertName, Certificate, InstanceId, NewInstance};

use super::{InstanceStore, StoreState};
use crate::error::StoreError;

/// In-memory store.
///
/// Counts every mutating call so callers can assert that a pass left the
/// store untouched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls served so far
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Insert an instance with an explicit id, bypassing id assignment.
    ///
    /// Later inserts continue after the highest id seen.
    pub fn seed_instance(&self, name: &CertName, instance: CertInstance) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if instance.id >= state.next_instance_id {
            state.next_instance_id = instance.id.next();
        }
        state.record_mut(name)?.instances.push(instance);
        Ok(())
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn certificates(&self) -> Result<Vec<Certificate>, StoreError> {
        Ok(self.state.lock().certificates())
    }

    async fn certificate(&self, name: &CertName) -> Result<Certificate, StoreError> {
        self.state.lock().certificate(name)
    }

    async fn instances_of(&self, name: &CertName) -> Result<Vec<CertInstance>, StoreError> {
        self.state.lock().instances_of(name)
    }

    async fn insert_instance(
        &self,
        name: &CertName,
        new: NewInstance,
    ) -> Result<CertInstance, StoreError> {
        self.mutated();
        self.state.lock().insert_instance(name, new)
    }

    async fn save_instance(&self, instance: &CertInstance) -> Result<(), StoreError> {
        self.mutated();
        self.state.lock().save_instance(instance)
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<u64, StoreError> {
        self.mutated();
        Ok(self.state.lock().delete_instance(id))
    }

    async fn update_authorized_until(
        &self,
        name: &CertName,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.mutated();
        self.state.lock().update_authorized_until(name, at)
    }

    async fn add_certificate(&self, certificate: Certificate) -> Result<(), StoreError> {
        self.mutated();
        self.state.lock().add_certificate(certificate)
    }

    async fn set_disabled(&self, name: &CertName, disabled: bool) -> Result<(), StoreError> {
        self.mutated();
        self.state.lock().set_disabled(name, disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwarden_common::{CertType, InstanceState};
    use chrono::Duration;

    fn new_instance(state: InstanceState) -> NewInstance {
        let now = Utc::now();
        NewInstance {
            state,
            not_before: now,
            not_after: now + Duration::days(90),
            cert_pem: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let name = CertName::new("www.example.org");
        store
            .add_certificate(Certificate::new("www.example.org", CertType::Acme))
            .await
            .unwrap();

        let first = store
            .insert_instance(&name, new_instance(InstanceState::Issued))
            .await
            .unwrap();
        let second = store
            .insert_instance(&name, new_instance(InstanceState::Issued))
            .await
            .unwrap();

        assert!(second.id > first.id);
        assert_eq!(store.instances_of(&name).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_reports_rows() {
        let store = MemoryStore::new();
        let name = CertName::new("mail.example.org");
        store
            .add_certificate(Certificate::new("mail.example.org", CertType::Local))
            .await
            .unwrap();
        let instance = store
            .insert_instance(&name, new_instance(InstanceState::Reserved))
            .await
            .unwrap();

        assert_eq!(store.delete_instance(instance.id).await.unwrap(), 1);
        assert_eq!(store.delete_instance(instance.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_unknown_instance() {
        let store = MemoryStore::new();
        let instance = new_instance(InstanceState::Issued).into_instance(InstanceId::new(99));

        let err = store.save_instance(&instance).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownInstance(id) if id == InstanceId::new(99)));
    }

    #[tokio::test]
    async fn test_seed_keeps_ids_monotonic() {
        let store = MemoryStore::new();
        let name = CertName::new("www.example.org");
        store
            .add_certificate(Certificate::new("www.example.org", CertType::Acme))
            .await
            .unwrap();

        store
            .seed_instance(
                &name,
                new_instance(InstanceState::Deployed).into_instance(InstanceId::new(41)),
            )
            .unwrap();
        let inserted = store
            .insert_instance(&name, new_instance(InstanceState::Issued))
            .await
            .unwrap();

        assert_eq!(inserted.id, InstanceId::new(42));
    }

    #[tokio::test]
    async fn test_duplicate_certificate_rejected() {
        let store = MemoryStore::new();
        let cert = Certificate::new("www.example.org", CertType::Acme);
        store.add_certificate(cert.clone()).await.unwrap();

        let err = store.add_certificate(cert).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCertificate(_)));
    }
}

//! Instance store implementations.
//!
//! The scheduler only talks to the [`InstanceStore`] trait. Two
//! implementations are provided: [`FileStore`] keeps the records in a JSON
//! state file, [`MemoryStore`] keeps them in memory.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use certwarden_common::{CertInstance, CertName, Certificate, InstanceId, NewInstance};

use crate::error::StoreError;

/// Persistent certificate and instance records.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// All certificate records, ordered by name.
    async fn certificates(&self) -> Result<Vec<Certificate>, StoreError>;

    async fn certificate(&self, name: &CertName) -> Result<Certificate, StoreError>;

    /// Instances of one certificate, ascending by id.
    async fn instances_of(&self, name: &CertName) -> Result<Vec<CertInstance>, StoreError>;

    /// Create an instance with the next free id.
    async fn insert_instance(
        &self,
        name: &CertName,
        new: NewInstance,
    ) -> Result<CertInstance, StoreError>;

    /// Update state, validity and material of an existing instance.
    async fn save_instance(&self, instance: &CertInstance) -> Result<(), StoreError>;

    /// Delete an instance by id and return the number of rows removed.
    async fn delete_instance(&self, id: InstanceId) -> Result<u64, StoreError>;

    async fn update_authorized_until(
        &self,
        name: &CertName,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn add_certificate(&self, certificate: Certificate) -> Result<(), StoreError>;

    async fn set_disabled(&self, name: &CertName, disabled: bool) -> Result<(), StoreError>;
}

/// A certificate together with its instances
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CertificateRecord {
    #[serde(flatten)]
    certificate: Certificate,
    #[serde(default)]
    instances: Vec<CertInstance>,
}

/// Complete store contents, shared by both implementations
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    /// Id handed to the next inserted instance
    next_instance_id: InstanceId,
    #[serde(default)]
    certificates: Vec<CertificateRecord>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            next_instance_id: InstanceId::new(1),
            certificates: Vec::new(),
        }
    }
}

impl StoreState {
    fn certificates(&self) -> Vec<Certificate> {
        let mut certificates: Vec<Certificate> = self
            .certificates
            .iter()
            .map(|record| record.certificate.clone())
            .collect();
        certificates.sort_by(|a, b| a.name.cmp(&b.name));
        certificates
    }

    fn record(&self, name: &CertName) -> Result<&CertificateRecord, StoreError> {
        self.certificates
            .iter()
            .find(|record| &record.certificate.name == name)
            .ok_or_else(|| StoreError::UnknownCertificate(name.clone()))
    }

    fn record_mut(&mut self, name: &CertName) -> Result<&mut CertificateRecord, StoreError> {
        self.certificates
            .iter_mut()
            .find(|record| &record.certificate.name == name)
            .ok_or_else(|| StoreError::UnknownCertificate(name.clone()))
    }

    fn certificate(&self, name: &CertName) -> Result<Certificate, StoreError> {
        self.record(name).map(|record| record.certificate.clone())
    }

    fn instances_of(&self, name: &CertName) -> Result<Vec<CertInstance>, StoreError> {
        let mut instances = self.record(name)?.instances.clone();
        instances.sort_by_key(|instance| instance.id);
        Ok(instances)
    }

    fn insert_instance(
        &mut self,
        name: &CertName,
        new: NewInstance,
    ) -> Result<CertInstance, StoreError> {
        let id = self.next_instance_id;
        let record = self.record_mut(name)?;
        let instance = new.into_instance(id);
        record.instances.push(instance.clone());
        self.next_instance_id = id.next();
        Ok(instance)
    }

    fn save_instance(&mut self, instance: &CertInstance) -> Result<(), StoreError> {
        let stored = self
            .certificates
            .iter_mut()
            .flat_map(|record| record.instances.iter_mut())
            .find(|stored| stored.id == instance.id)
            .ok_or(StoreError::UnknownInstance(instance.id))?;
        *stored = instance.clone();
        Ok(())
    }

    fn delete_instance(&mut self, id: InstanceId) -> u64 {
        let mut removed = 0;
        for record in &mut self.certificates {
            let before = record.instances.len();
            record.instances.retain(|instance| instance.id != id);
            removed += (before - record.instances.len()) as u64;
        }
        removed
    }

    fn update_authorized_until(
        &mut self,
        name: &CertName,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.record_mut(name)?.certificate.authorized_until = at;
        Ok(())
    }

    fn add_certificate(&mut self, certificate: Certificate) -> Result<(), StoreError> {
        if self.record(&certificate.name).is_ok() {
            return Err(StoreError::DuplicateCertificate(certificate.name));
        }
        self.certificates.push(CertificateRecord {
            certificate,
            instances: Vec::new(),
        });
        Ok(())
    }

    fn set_disabled(&mut self, name: &CertName, disabled: bool) -> Result<(), StoreError> {
        self.record_mut(name)?.certificate.disabled = disabled;
        Ok(())
    }
}

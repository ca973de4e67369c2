//! File-backed instance store
//!
//! Keeps all certificate and instance records in one JSON document.
//!
//! # Directory Structure
//!
//! ```text
//! storage/
//! ├── state.json        # Certificates, their instances, next instance id
//! └── state.json.tmp    # Written first, then renamed over state.json
//! ```
//!
//! Every operation reads the file, applies the change and writes it back,
//! so certificate edits made from the command line while a daemon is
//! running are picked up by its next pass.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use certwarden_common::{CertInstance, CertName, Certificate, InstanceId, NewInstance};

use super::{InstanceStore, StoreState};
use crate::error::StoreError;

const STATE_FILE: &str = "state.json";

/// JSON file store
#[derive(Debug)]
pub struct FileStore {
    /// Base storage directory
    base_path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at the given path
    ///
    /// Creates the directory if it doesn't exist and sets restrictive
    /// permissions (0700 on Unix).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or permissions
    /// cannot be set.
    pub fn open(base_path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(base_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(base_path, fs::Permissions::from_mode(0o700))?;
        }

        info!(
            storage_path = %base_path.display(),
            "Opened certificate store"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// Get the storage base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn state_path(&self) -> PathBuf {
        self.base_path.join(STATE_FILE)
    }

    fn load(&self) -> Result<StoreState, StoreError> {
        let path = self.state_path();

        if !path.exists() {
            trace!("No state file yet, starting empty");
            return Ok(StoreState::default());
        }

        let content = fs::read_to_string(&path)?;
        let state: StoreState = serde_json::from_str(&content)?;
        trace!(
            certificates = state.certificates.len(),
            "Loaded store state"
        );
        Ok(state)
    }

    fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let path = self.state_path();
        let tmp_path = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, &path)?;
        debug!(path = %path.display(), "Persisted store state");
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _guard = self.lock.lock();
        let state = self.load()?;
        f(&state)
    }

    fn modify<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock();
        let mut state = self.load()?;
        let value = f(&mut state)?;
        self.persist(&state)?;
        Ok(value)
    }
}

#[async_trait]
impl InstanceStore for FileStore {
    async fn certificates(&self) -> Result<Vec<Certificate>, StoreError> {
        self.read(|state| Ok(state.certificates()))
    }

    async fn certificate(&self, name: &CertName) -> Result<Certificate, StoreError> {
        self.read(|state| state.certificate(name))
    }

    async fn instances_of(&self, name: &CertName) -> Result<Vec<CertInstance>, StoreError> {
        self.read(|state| state.instances_of(name))
    }

    async fn insert_instance(
        &self,
        name: &CertName,
        new: NewInstance,
    ) -> Result<CertInstance, StoreError> {
        self.modify(|state| state.insert_instance(name, new))
    }

    async fn save_instance(&self, instance: &CertInstance) -> Result<(), StoreError> {
        self.modify(|state| state.save_instance(instance))
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<u64, StoreError> {
        self.modify(|state| Ok(state.delete_instance(id)))
    }

    async fn update_authorized_until(
        &self,
        name: &CertName,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.modify(|state| state.update_authorized_until(name, at))
    }

    async fn add_certificate(&self, certificate: Certificate) -> Result<(), StoreError> {
        self.modify(|state| state.add_certificate(certificate))
    }

    async fn set_disabled(&self, name: &CertName, disabled: bool) -> Result<(), StoreError> {
        self.modify(|state| state.set_disabled(name, disabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwarden_common::{CertType, InstanceState};
    use chrono::Duration;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, FileStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(&temp_dir.path().join("pki")).unwrap();
        (temp_dir, store)
    }

    fn issued(days: i64) -> NewInstance {
        let now = Utc::now();
        NewInstance {
            state: InstanceState::Issued,
            not_before: now,
            not_after: now + Duration::days(days),
            cert_pem: Some("-----BEGIN CERTIFICATE-----\ntest\n-----END CERTIFICATE-----".into()),
        }
    }

    #[test]
    fn test_store_creation() {
        let (_temp_dir, store) = setup_store();
        assert!(store.base_path().exists());
        assert!(!store.state_path().exists());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (_temp_dir, store) = setup_store();
        assert!(store.certificates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let (temp_dir, store) = setup_store();
        let name = CertName::new("www.example.org");

        store
            .add_certificate(Certificate::new("www.example.org", CertType::Acme))
            .await
            .unwrap();
        let instance = store.insert_instance(&name, issued(90)).await.unwrap();

        let reopened = FileStore::open(&temp_dir.path().join("pki")).unwrap();
        let instances = reopened.instances_of(&name).await.unwrap();

        assert_eq!(instances, vec![instance]);
    }

    #[tokio::test]
    async fn test_save_and_delete_instance() {
        let (_temp_dir, store) = setup_store();
        let name = CertName::new("mail.example.org");
        store
            .add_certificate(Certificate::new("mail.example.org", CertType::Acme))
            .await
            .unwrap();

        let mut instance = store.insert_instance(&name, issued(90)).await.unwrap();
        instance.state = InstanceState::Deployed;
        store.save_instance(&instance).await.unwrap();

        let stored = store.instances_of(&name).await.unwrap();
        assert_eq!(stored[0].state, InstanceState::Deployed);

        assert_eq!(store.delete_instance(instance.id).await.unwrap(), 1);
        assert_eq!(store.delete_instance(instance.id).await.unwrap(), 0);
        assert!(store.instances_of(&name).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let (_temp_dir, store) = setup_store();
        let name = CertName::new("www.example.org");
        store
            .add_certificate(Certificate::new("www.example.org", CertType::Acme))
            .await
            .unwrap();

        let first = store.insert_instance(&name, issued(90)).await.unwrap();
        store.delete_instance(first.id).await.unwrap();
        let second = store.insert_instance(&name, issued(90)).await.unwrap();

        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_certificate_flags() {
        let (_temp_dir, store) = setup_store();
        let name = CertName::new("vpn.example.org");
        store
            .add_certificate(Certificate::new("vpn.example.org", CertType::Local))
            .await
            .unwrap();

        let at = Utc::now();
        store.set_disabled(&name, true).await.unwrap();
        store.update_authorized_until(&name, Some(at)).await.unwrap();

        let cert = store.certificate(&name).await.unwrap();
        assert!(cert.disabled);
        assert_eq!(cert.authorized_until, Some(at));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_state_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp_dir, store) = setup_store();
        store
            .add_certificate(Certificate::new("www.example.org", CertType::Acme))
            .await
            .unwrap();

        let mode = fs::metadata(store.state_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

//! Deferred deletion of instances.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use certwarden_common::{CertName, InstanceId};

use crate::store::InstanceStore;

/// Instances queued for deletion by a pass, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionSet {
    entries: BTreeMap<InstanceId, CertName>,
}

/// A delete that did not remove exactly one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMismatch {
    pub cert: CertName,
    pub instance: InstanceId,
    /// Rows removed, or `None` when the store call failed
    pub rows: Option<u64>,
    pub error: Option<String>,
}

impl DeletionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, cert: &CertName, ids: impl IntoIterator<Item = InstanceId>) {
        for id in ids {
            self.entries.insert(id, cert.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.entries.keys().copied()
    }

    /// Delete every queued instance, in id order
    ///
    /// Returns the ids deleted and the deletes that went wrong. Neither
    /// stops the remaining deletes; a stale row is picked up again by the
    /// next pass.
    pub async fn apply(
        self,
        store: &dyn InstanceStore,
    ) -> (Vec<InstanceId>, Vec<DeleteMismatch>) {
        let mut deleted = Vec::with_capacity(self.entries.len());
        let mut mismatches = Vec::new();

        for (id, cert) in self.entries {
            match store.delete_instance(id).await {
                Ok(1) => {
                    debug!(cert = %cert, instance = %id, "Deleted instance");
                    deleted.push(id);
                }
                Ok(rows) => {
                    warn!(cert = %cert, instance = %id, rows = rows, "Failed to delete instance");
                    mismatches.push(DeleteMismatch {
                        cert,
                        instance: id,
                        rows: Some(rows),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(cert = %cert, instance = %id, error = %e, "Failed to delete instance");
                    mismatches.push(DeleteMismatch {
                        cert,
                        instance: id,
                        rows: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        (deleted, mismatches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use certwarden_common::{CertInstance, CertType, Certificate, InstanceState};
    use chrono::{Duration, Utc};

    async fn store_with(ids: &[u64]) -> MemoryStore {
        let store = MemoryStore::new();
        let name = CertName::new("www.example.org");
        store
            .add_certificate(Certificate::new("www.example.org", CertType::Acme))
            .await
            .unwrap();
        let now = Utc::now();
        for id in ids {
            store
                .seed_instance(
                    &name,
                    CertInstance {
                        id: InstanceId::new(*id),
                        state: InstanceState::Archived,
                        not_before: now - Duration::days(180),
                        not_after: now - Duration::days(90),
                        cert_pem: None,
                    },
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_duplicates_collapse() {
        let name = CertName::new("www.example.org");
        let mut set = DeletionSet::new();
        set.extend(&name, [InstanceId::new(3), InstanceId::new(1)]);
        set.extend(&name, [InstanceId::new(3)]);

        assert_eq!(set.len(), 2);
        assert_eq!(
            set.ids().collect::<Vec<_>>(),
            vec![InstanceId::new(1), InstanceId::new(3)]
        );
    }

    #[tokio::test]
    async fn test_apply_deletes_all() {
        let store = store_with(&[1, 2]).await;
        let mut set = DeletionSet::new();
        set.extend(
            &CertName::new("www.example.org"),
            [InstanceId::new(2), InstanceId::new(1)],
        );

        let (deleted, mismatches) = set.apply(&store).await;

        assert_eq!(deleted, vec![InstanceId::new(1), InstanceId::new(2)]);
        assert!(mismatches.is_empty());
        assert!(store
            .instances_of(&CertName::new("www.example.org"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_row_is_mismatch() {
        let store = store_with(&[1]).await;
        let mut set = DeletionSet::new();
        set.extend(
            &CertName::new("www.example.org"),
            [InstanceId::new(1), InstanceId::new(7)],
        );

        let (deleted, mismatches) = set.apply(&store).await;

        assert_eq!(deleted, vec![InstanceId::new(1)]);
        assert_eq!(
            mismatches,
            vec![DeleteMismatch {
                cert: CertName::new("www.example.org"),
                instance: InstanceId::new(7),
                rows: Some(0),
                error: None,
            }]
        );
    }
}

//! Retention of historical instances.
//!
//! Keeps at most one instance per lifecycle stage: the one with the highest
//! id. `reserved` and `archived` instances never survive.

use tracing::{debug, trace};

use certwarden_common::{CertInstance, InstanceId, InstanceState};

/// Result of partitioning one certificate's instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retention {
    /// Surviving instances, ascending by id
    pub survivors: Vec<CertInstance>,
    /// Instances to delete at the end of the pass, ascending by id
    pub doomed: Vec<InstanceId>,
}

impl Retention {
    /// No instance survived; the certificate needs a fresh one
    pub fn is_empty(&self) -> bool {
        self.survivors.is_empty()
    }
}

/// Split instances into survivors and deletion candidates
///
/// Pure: nothing is deleted here, and feeding the survivors back in yields
/// the same survivors with nothing doomed.
pub fn partition(instances: &[CertInstance]) -> Retention {
    let mut doomed = Vec::new();
    let mut candidates: Vec<&CertInstance> = Vec::with_capacity(instances.len());

    for instance in instances {
        trace!(instance = %instance, "Retention input");
        if instance.state.is_garbage() {
            doomed.push(instance.id);
        } else {
            candidates.push(instance);
        }
    }

    let mut survivors = Vec::with_capacity(InstanceState::RETAINED.len());
    for state in InstanceState::RETAINED {
        let mut in_state: Vec<&CertInstance> = candidates
            .iter()
            .copied()
            .filter(|instance| instance.state == state)
            .collect();
        in_state.sort_by_key(|instance| instance.id);

        if let Some(newest) = in_state.pop() {
            doomed.extend(in_state.iter().map(|instance| instance.id));
            survivors.push(newest.clone());
        }
    }

    survivors.sort_by_key(|instance| instance.id);
    doomed.sort();

    debug!(
        survivors = survivors.len(),
        doomed = doomed.len(),
        "Partitioned instances"
    );

    Retention { survivors, doomed }
}

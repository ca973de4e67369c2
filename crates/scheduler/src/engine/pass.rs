//! Scheduling pass orchestration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use certwarden_common::{CertName, Certificate, ExecutionMode, InstanceId, PassId};

use super::actions::Actions;
use super::apply::{DeleteMismatch, DeletionSet};
use super::notify::ReminderBatch;
use super::rollover;
use super::{CertOutcome, SchedulerSettings};
use crate::clock::Clock;
use crate::collab::Collaborators;
use crate::error::{ScheduleError, StoreError};

/// A certificate whose evaluation stopped early
#[derive(Debug, Clone, Serialize)]
pub struct CertFailure {
    pub cert: CertName,
    pub error: String,
    pub invariant_violation: bool,
}

/// Summary of one pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    /// Certificates evaluated, including failed ones
    pub evaluated: usize,
    /// CA certificates left to their own bootstrap path
    pub skipped: usize,
    pub failures: Vec<CertFailure>,
    pub deleted: Vec<InstanceId>,
    #[serde(skip)]
    pub delete_mismatches: Vec<DeleteMismatch>,
    /// Deletions a preview pass would have made
    pub pending_deletions: Vec<InstanceId>,
    pub reminded: Vec<CertName>,
    pub reminder_error: Option<String>,
}

impl PassReport {
    fn new(pass_id: &PassId, mode: ExecutionMode, started_at: DateTime<Utc>) -> Self {
        Self {
            pass_id: pass_id.to_string(),
            mode: mode.to_string(),
            started_at,
            evaluated: 0,
            skipped: 0,
            failures: Vec::new(),
            deleted: Vec::new(),
            delete_mismatches: Vec::new(),
            pending_deletions: Vec::new(),
            reminded: Vec::new(),
            reminder_error: None,
        }
    }

    /// Whether every certificate and every deferred step went through
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.delete_mismatches.is_empty()
            && self.reminder_error.is_none()
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pass {}: {} evaluated, {} skipped, {} failed, {} deleted",
            self.mode,
            self.pass_id,
            self.evaluated,
            self.skipped,
            self.failures.len(),
            self.deleted.len(),
        )?;
        if !self.pending_deletions.is_empty() {
            write!(f, ", {} would be deleted", self.pending_deletions.len())?;
        }
        if !self.reminded.is_empty() {
            write!(f, ", {} reminded", self.reminded.len())?;
        }
        Ok(())
    }
}

/// Runs scheduling passes over all stored certificates
pub struct PassScheduler {
    collab: Collaborators,
    settings: SchedulerSettings,
}

impl PassScheduler {
    pub fn new(collab: Collaborators, settings: SchedulerSettings) -> Self {
        Self { collab, settings }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run one pass over every certificate in the store
    pub async fn run(&self, mode: ExecutionMode) -> Result<PassReport, StoreError> {
        let certificates = self.collab.store.certificates().await?;
        Ok(self.run_pass(&certificates, mode).await)
    }

    /// Run one pass over `certificates`
    ///
    /// Certificates are evaluated one after another; a failure ends only
    /// that certificate's evaluation. Deletions and the reminder mail
    /// happen after the last certificate, and only in live mode.
    pub async fn run_pass(&self, certificates: &[Certificate], mode: ExecutionMode) -> PassReport {
        let pass_id = PassId::new();
        let span = info_span!("pass", pass_id = %pass_id, mode = %mode);

        async {
            let now = self.collab.clock.now();
            let mut report = PassReport::new(&pass_id, mode, now);
            let actions = Actions::new(&self.collab, mode);
            let mut deletions = DeletionSet::new();
            let mut reminders = ReminderBatch::new();

            info!(certificates = certificates.len(), "Starting scheduling pass");

            for cert in certificates {
                debug!(
                    cert = %cert.name,
                    disabled = cert.disabled,
                    cert_type = %cert.cert_type,
                    "Evaluating certificate"
                );

                if cert.is_ca() {
                    debug!(cert = %cert.name, "Skipping CA certificate");
                    report.skipped += 1;
                    continue;
                }

                report.evaluated += 1;
                let mut outcome = CertOutcome::default();
                let result =
                    rollover::evaluate(&actions, &self.settings, now, cert, &mut outcome).await;

                deletions.extend(&cert.name, outcome.deletions);
                if outcome.needs_reminder {
                    reminders.push(cert.clone());
                }

                if let Err(e) = result {
                    report.failures.push(failure(cert, &e));
                }
            }

            if mode.is_preview() {
                report.pending_deletions = deletions.ids().collect();
                if !reminders.is_empty() {
                    debug!(
                        certificates = ?reminders.names(),
                        "Would send renewal reminder"
                    );
                }
                debug!(deletions = deletions.len(), "Would delete and mail");
            } else {
                let (deleted, mismatches) = deletions.apply(self.collab.store.as_ref()).await;
                report.deleted = deleted;
                report.delete_mismatches = mismatches;

                match reminders.flush(&self.collab, &self.settings, now).await {
                    Ok(reminded) => report.reminded = reminded,
                    Err(e) => {
                        warn!(error = %e, "Renewal reminder not sent");
                        report.reminder_error = Some(e.to_string());
                    }
                }
            }

            info!(
                evaluated = report.evaluated,
                skipped = report.skipped,
                failed = report.failures.len(),
                deleted = report.deleted.len(),
                reminded = report.reminded.len(),
                "Scheduling pass complete"
            );
            report
        }
        .instrument(span)
        .await
    }
}

fn failure(cert: &Certificate, e: &ScheduleError) -> CertFailure {
    if e.is_invariant_violation() {
        error!(cert = %cert.name, error = %e, "Lifecycle invariant violated, certificate skipped");
    } else {
        error!(cert = %cert.name, error = %e, "Certificate evaluation failed");
    }
    CertFailure {
        cert: cert.name.clone(),
        error: e.to_string(),
        invariant_violation: e.is_invariant_violation(),
    }
}

impl fmt::Debug for PassScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassScheduler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

//! Per-certificate rollover state machine.
//!
//! Survivors of retention are sorted into three slots (`issued`,
//! `prepublished`, `deployed`), checked for a useless issued instance and a
//! due reminder, and then planned:
//!
//! - **Replace**: nothing is deployed, or the deployed instance is within a
//!   day of expiry. The prepublished instance is distributed if there is
//!   one, else the issued one, else a fresh one. The old deployed instance
//!   is then expired, also when no replacement exists (local certificates).
//!   A failed issue or distribution leaves it deployed.
//! - **Prepublish**: the deployed instance is healthy but inside the
//!   pre-publish window. A successor's fingerprint is published next to the
//!   deployed one so resolvers have both cached before cutover.
//!
//! Planning is pure. [`evaluate`] runs retention, classification and the
//! plan against the collaborators.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use certwarden_common::{CertInstance, Certificate, InstanceId, InstanceState};

use super::actions::{Actions, IssueOutcome};
use super::retention;
use super::{CertOutcome, SchedulerSettings};
use crate::error::ScheduleError;

/// How long past `not_after` a non-deployed instance is still classified
pub fn hard_expiry_grace() -> Duration {
    Duration::days(1)
}

/// How close to `not_after` a deployed instance gets replaced
pub fn deployed_expiry_margin() -> Duration {
    Duration::days(1)
}

/// `not_after` of `instance` shifted by `delta`, or `DateOutOfRange` when
/// the result leaves chrono's range
fn shifted(instance: &CertInstance, delta: Duration) -> Result<DateTime<Utc>, ScheduleError> {
    instance
        .not_after
        .checked_add_signed(delta)
        .ok_or(ScheduleError::DateOutOfRange {
            instance: instance.id,
            not_after: instance.not_after,
        })
}

/// The live instances of a certificate, one per stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    pub issued: Option<CertInstance>,
    pub prepublished: Option<CertInstance>,
    pub deployed: Option<CertInstance>,
}

/// Survivors sorted into slots plus the bookkeeping transitions found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub slots: Slots,
    /// `expired` instances, to become `archived`
    pub to_archive: Vec<CertInstance>,
    /// Non-deployed instances past validity plus grace
    pub to_expire: Vec<CertInstance>,
}

/// Sort survivors into slots
///
/// Fails on a survivor whose state cannot be live, which retention never
/// produces, and on a `not_after` too close to the end of time.
pub fn classify(
    now: DateTime<Utc>,
    survivors: &[CertInstance],
) -> Result<Classification, ScheduleError> {
    let mut classification = Classification::default();

    for instance in survivors {
        match instance.state {
            InstanceState::Expired => classification.to_archive.push(instance.clone()),
            state
                if state != InstanceState::Deployed
                    && now >= shifted(instance, hard_expiry_grace())? =>
            {
                classification.to_expire.push(instance.clone());
            }
            InstanceState::Issued => classification.slots.issued = Some(instance.clone()),
            InstanceState::Prepublished => {
                classification.slots.prepublished = Some(instance.clone())
            }
            InstanceState::Deployed => classification.slots.deployed = Some(instance.clone()),
            state @ (InstanceState::Reserved | InstanceState::Archived) => {
                return Err(ScheduleError::InvariantViolation {
                    instance: instance.id,
                    state,
                });
            }
        }
    }

    Ok(classification)
}

/// Findings of the checks that run after classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Review {
    /// Issued instance expiring too soon to ever replace the deployed one
    pub futile: Option<InstanceId>,
    pub needs_reminder: bool,
}

/// Drop a futile issued instance from the slots and check whether a local
/// certificate needs a renewal reminder
pub fn review(
    now: DateTime<Utc>,
    settings: &SchedulerSettings,
    cert: &Certificate,
    slots: &mut Slots,
) -> Result<Review, ScheduleError> {
    let mut review = Review::default();

    if let (Some(deployed), Some(issued)) = (&slots.deployed, &slots.issued) {
        if issued.not_after < shifted(deployed, settings.reminder_lead)? {
            review.futile = Some(issued.id);
        }
    }
    if review.futile.is_some() {
        slots.issued = None;
    }

    if let Some(deployed) = &slots.deployed {
        review.needs_reminder = cert.is_local()
            && cert.authorized_until.is_none()
            && now >= shifted(deployed, -settings.reminder_lead)?;
    }

    Ok(review)
}

/// Instance to distribute in place of the deployed one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Prepublished(CertInstance),
    Issued(CertInstance),
    IssueNew,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// Local certificates carry no DNS fingerprints
    LocalCertificate,
    OutsidePrepublishWindow,
    AlreadyPrepublished,
}

/// What to do with a certificate after bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverPlan {
    /// Bookkeeping only
    Disabled,
    /// Distribute `candidate`, then expire `retire`
    Replace {
        candidate: Candidate,
        retire: Option<CertInstance>,
    },
    /// Publish a successor's fingerprint next to `active`; a new
    /// instance is issued when `candidate` is `None`
    Prepublish {
        active: CertInstance,
        candidate: Option<CertInstance>,
    },
    Hold(HoldReason),
}

pub fn plan(
    now: DateTime<Utc>,
    settings: &SchedulerSettings,
    cert: &Certificate,
    slots: &Slots,
) -> Result<RolloverPlan, ScheduleError> {
    if cert.disabled {
        return Ok(RolloverPlan::Disabled);
    }

    let deployed = match &slots.deployed {
        Some(deployed) if now < shifted(deployed, -deployed_expiry_margin())? => deployed,
        retire => {
            let candidate = if let Some(prepublished) = &slots.prepublished {
                Candidate::Prepublished(prepublished.clone())
            } else if let Some(issued) = &slots.issued {
                Candidate::Issued(issued.clone())
            } else {
                Candidate::IssueNew
            };
            return Ok(RolloverPlan::Replace {
                candidate,
                retire: retire.clone(),
            });
        }
    };

    let plan = if cert.is_local() {
        RolloverPlan::Hold(HoldReason::LocalCertificate)
    } else if now < shifted(deployed, -settings.pre_publish_window)? {
        RolloverPlan::Hold(HoldReason::OutsidePrepublishWindow)
    } else if slots.prepublished.is_some() {
        RolloverPlan::Hold(HoldReason::AlreadyPrepublished)
    } else {
        RolloverPlan::Prepublish {
            active: deployed.clone(),
            candidate: slots.issued.clone(),
        }
    };
    Ok(plan)
}

/// Evaluate one certificate
///
/// Deletions and the reminder flag are recorded in `outcome` as soon as
/// they are known, so they still count when a later step fails.
pub(crate) async fn evaluate(
    actions: &Actions<'_>,
    settings: &SchedulerSettings,
    now: DateTime<Utc>,
    cert: &Certificate,
    outcome: &mut CertOutcome,
) -> Result<(), ScheduleError> {
    let instances = actions.collab().store.instances_of(&cert.name).await?;
    let retention = retention::partition(&instances);
    outcome.deletions.extend(retention.doomed.iter().copied());

    if retention.is_empty() {
        debug!(cert = %cert.name, "No surviving instances");
    }

    let Classification {
        mut slots,
        to_archive,
        to_expire,
    } = classify(now, &retention.survivors)?;

    for instance in &to_archive {
        actions.archive(cert, instance).await?;
    }
    for instance in &to_expire {
        actions.expire(cert, instance).await?;
    }

    let review = review(now, settings, cert, &mut slots)?;
    if let Some(futile) = review.futile {
        info!(cert = %cert.name, instance = %futile, "Issued instance expires too early to replace deployed one");
        outcome.deletions.push(futile);
    }
    if review.needs_reminder {
        debug!(cert = %cert.name, "Queued for renewal reminder");
        outcome.needs_reminder = true;
    }

    let plan = plan(now, settings, cert, &slots)?;
    debug!(cert = %cert.name, plan = ?plan, "Rollover plan");

    match plan {
        RolloverPlan::Disabled => {
            debug!(cert = %cert.name, "Disabled, bookkeeping only");
            Ok(())
        }
        RolloverPlan::Hold(reason) => {
            debug!(cert = %cert.name, reason = ?reason, "Nothing to roll over");
            Ok(())
        }
        RolloverPlan::Replace { candidate, retire } => {
            replace(actions, cert, candidate, retire).await
        }
        RolloverPlan::Prepublish { active, candidate } => {
            prepublish(actions, cert, active, candidate).await
        }
    }
}

async fn replace(
    actions: &Actions<'_>,
    cert: &Certificate,
    candidate: Candidate,
    retire: Option<CertInstance>,
) -> Result<(), ScheduleError> {
    match candidate {
        Candidate::Prepublished(instance) | Candidate::Issued(instance) => {
            actions.distribute(cert, &instance).await?;
        }
        Candidate::IssueNew => match actions.issue(cert).await? {
            IssueOutcome::Issued(instance) => actions.distribute(cert, &instance).await?,
            IssueOutcome::Previewed => {
                debug!(cert = %cert.name, "Would distribute freshly issued instance");
            }
            IssueOutcome::NotApplicable => {
                if let Some(old) = &retire {
                    warn!(
                        cert = %cert.name,
                        instance = %old.id,
                        not_after = %old.not_after,
                        "No replacement available, retiring deployed instance"
                    );
                }
            }
        },
    }

    match retire {
        Some(old) => actions.expire(cert, &old).await,
        None => Ok(()),
    }
}

async fn prepublish(
    actions: &Actions<'_>,
    cert: &Certificate,
    active: CertInstance,
    candidate: Option<CertInstance>,
) -> Result<(), ScheduleError> {
    let candidate = match candidate {
        Some(candidate) => candidate,
        None => match actions.issue(cert).await? {
            IssueOutcome::Issued(instance) => instance,
            IssueOutcome::Previewed => {
                debug!(cert = %cert.name, active = %active.id, "Would prepublish freshly issued instance");
                return Ok(());
            }
            IssueOutcome::NotApplicable => {
                error!(cert = %cert.name, "Failed to issue an instance for prepublishing");
                return Err(ScheduleError::NoPrepublishCandidate);
            }
        },
    };

    actions.prepublish(cert, &active, &candidate).await
}

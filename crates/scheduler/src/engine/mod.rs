//! Lifecycle scheduling engine.
//!
//! One pass evaluates every managed certificate in turn:
//!
//! 1. [`retention`] reduces the instances to one survivor per state and
//!    queues the rest for deletion.
//! 2. [`rollover`] classifies the survivors, decides between replacing the
//!    deployed instance and prepublishing its successor, and carries the
//!    decision out through [`Actions`](actions::Actions).
//! 3. Once every certificate has been evaluated, [`apply`] deletes the
//!    queued instances and [`notify`] sends the batched reminder.
//!
//! Per-certificate results are returned as [`CertOutcome`] values and merged
//! by [`PassScheduler`]; nothing is shared between evaluations.

mod actions;
pub mod apply;
pub mod notify;
mod pass;
pub mod retention;
pub mod rollover;

#[cfg(test)]
pub(crate) mod testing;

pub use apply::{DeleteMismatch, DeletionSet};
pub use notify::ReminderBatch;
pub use pass::{CertFailure, PassReport, PassScheduler};
pub use retention::Retention;
pub use rollover::{Candidate, HoldReason, RolloverPlan, Slots};

use chrono::Duration;

use certwarden_common::InstanceId;
use certwarden_config::Config;

/// Tunables of the rollover protocol and the reminder mail
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// How long before expiry dual DNS publication begins
    pub pre_publish_window: Duration,
    /// Reminder lead time and futility threshold
    pub reminder_lead: Duration,
    pub mail_from: String,
    pub mail_to: String,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        let (mail_from, mail_to) = config
            .mail
            .as_ref()
            .map(|mail| (mail.sender.clone(), mail.recipient.clone()))
            .unwrap_or_default();

        Self {
            pre_publish_window: config.schedule.pre_publish_window(),
            reminder_lead: config.schedule.reminder_lead(),
            mail_from,
            mail_to,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            pre_publish_window: Duration::days(7),
            reminder_lead: Duration::days(30),
            mail_from: String::new(),
            mail_to: String::new(),
        }
    }
}

/// What evaluating one certificate leaves for the end of the pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertOutcome {
    /// Instances to delete once every certificate has been evaluated
    pub deletions: Vec<InstanceId>,
    /// The certificate belongs in this pass's reminder mail
    pub needs_reminder: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = Config::from_kdl(
            r#"
            storage { path "/tmp/certwarden" }
            schedule {
                pre-publish-window-days 10
                reminder-lead-days 45
            }
            mail {
                sender "certwarden@example.org"
                recipient "pki@example.org"
            }
            "#,
        )
        .unwrap();

        let settings = SchedulerSettings::from_config(&config);

        assert_eq!(settings.pre_publish_window, Duration::days(10));
        assert_eq!(settings.reminder_lead, Duration::days(45));
        assert_eq!(settings.mail_from, "certwarden@example.org");
        assert_eq!(settings.mail_to, "pki@example.org");
    }

    #[test]
    fn test_settings_without_mail() {
        let config = Config::from_kdl(r#"storage { path "/tmp/certwarden" }"#).unwrap();
        let settings = SchedulerSettings::from_config(&config);
        assert!(settings.mail_from.is_empty());
        assert_eq!(settings.pre_publish_window, Duration::days(7));
    }
}

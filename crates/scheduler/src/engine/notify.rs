//! Batched renewal reminders for local certificates.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use certwarden_common::{CertName, Certificate};

use super::SchedulerSettings;
use crate::collab::{Collaborators, MailMessage};
use crate::error::ScheduleError;

pub const REMINDER_SUBJECT: &str = "Local certificate issue reminder";

/// Certificates flagged for a reminder during one pass, in flag order
#[derive(Debug, Clone, Default)]
pub struct ReminderBatch {
    certificates: Vec<Certificate>,
}

impl ReminderBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn names(&self) -> Vec<CertName> {
        self.certificates.iter().map(|c| c.name.clone()).collect()
    }

    /// The one reminder message for this batch
    pub fn compose(&self, now: DateTime<Utc>, settings: &SchedulerSettings) -> MailMessage {
        let deadline = now
            .checked_add_signed(settings.reminder_lead)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .date_naive();
        let mut body = format!(
            "Following local Certificates must be issued prior to {}:\n",
            deadline
        );
        for certificate in &self.certificates {
            let marker = if certificate.disabled { "[DISABLED]" } else { "" };
            body.push_str(&format!("\t{} \t{}\n", certificate.name, marker));
        }

        MailMessage {
            subject: REMINDER_SUBJECT.to_string(),
            body,
            from: settings.mail_from.clone(),
            to: settings.mail_to.clone(),
        }
    }

    /// Send the reminder and mark every listed certificate as authorized
    ///
    /// `authorized_until` is only touched after the mail went out, so a
    /// failed send is retried on the next pass. A certificate whose record
    /// cannot be updated is logged and skipped; it is reminded again next
    /// pass. Returns the names that were marked.
    pub async fn flush(
        self,
        collab: &Collaborators,
        settings: &SchedulerSettings,
        now: DateTime<Utc>,
    ) -> Result<Vec<CertName>, ScheduleError> {
        if self.is_empty() {
            debug!("No reminders to send");
            return Ok(Vec::new());
        }

        let message = self.compose(now, settings);
        collab
            .mailer
            .send(&message)
            .await
            .map_err(ScheduleError::Mail)?;

        info!(certificates = self.len(), to = %message.to, "Sent renewal reminder");

        let mut marked = Vec::with_capacity(self.len());
        for certificate in self.certificates {
            match collab
                .store
                .update_authorized_until(&certificate.name, Some(now))
                .await
            {
                Ok(()) => marked.push(certificate.name),
                Err(e) => {
                    warn!(cert = %certificate.name, error = %e, "Failed to record renewal reminder");
                }
            }
        }

        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Harness;
    use certwarden_common::CertType;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 8, 30, 0).unwrap()
    }

    fn batch() -> ReminderBatch {
        let mut disabled = Certificate::new("old.example.org", CertType::Local);
        disabled.disabled = true;

        let mut batch = ReminderBatch::new();
        batch.push(Certificate::new("vpn.example.org", CertType::Local));
        batch.push(disabled);
        batch
    }

    #[test]
    fn test_compose_lists_certificates() {
        let message = batch().compose(now(), &Harness::settings());

        assert_eq!(message.subject, "Local certificate issue reminder");
        assert_eq!(message.from, "certwarden@example.org");
        assert_eq!(message.to, "pki@example.org");
        assert_eq!(
            message.body,
            "Following local Certificates must be issued prior to 2025-02-01:\n\
             \tvpn.example.org \t\n\
             \told.example.org \t[DISABLED]\n"
        );
    }

    #[tokio::test]
    async fn test_flush_marks_authorized_after_send() {
        let harness = Harness::new(now());
        harness.add(Certificate::new("vpn.example.org", CertType::Local)).await;
        let mut disabled = Certificate::new("old.example.org", CertType::Local);
        disabled.disabled = true;
        harness.add(disabled).await;

        let reminded = batch()
            .flush(&harness.collab, &Harness::settings(), now())
            .await
            .unwrap();

        assert_eq!(reminded.len(), 2);
        assert_eq!(harness.mailer.sent().len(), 1);
        assert_eq!(
            harness.certificate("vpn.example.org").await.authorized_until,
            Some(now())
        );
        assert_eq!(
            harness.certificate("old.example.org").await.authorized_until,
            Some(now())
        );
    }

    #[tokio::test]
    async fn test_failed_send_leaves_authorization() {
        let harness = Harness::new(now());
        harness.add(Certificate::new("vpn.example.org", CertType::Local)).await;
        harness.mailer.set_failing(true);

        let mut batch = ReminderBatch::new();
        batch.push(Certificate::new("vpn.example.org", CertType::Local));
        let err = batch
            .flush(&harness.collab, &Harness::settings(), now())
            .await
            .unwrap_err();

        assert!(matches!(err, ScheduleError::Mail(_)));
        assert_eq!(
            harness.certificate("vpn.example.org").await.authorized_until,
            None
        );
    }

    #[tokio::test]
    async fn test_unrecorded_certificate_does_not_hide_others() {
        let harness = Harness::new(now());
        harness.add(Certificate::new("vpn.example.org", CertType::Local)).await;

        let mut batch = ReminderBatch::new();
        batch.push(Certificate::new("gone.example.org", CertType::Local));
        batch.push(Certificate::new("vpn.example.org", CertType::Local));
        let reminded = batch
            .flush(&harness.collab, &Harness::settings(), now())
            .await
            .unwrap();

        assert_eq!(reminded, vec![CertName::new("vpn.example.org")]);
        assert_eq!(harness.mailer.sent().len(), 1);
        assert_eq!(
            harness.certificate("vpn.example.org").await.authorized_until,
            Some(now())
        );
    }

    #[test]
    fn test_compose_with_oversized_lead() {
        let settings = SchedulerSettings {
            reminder_lead: chrono::Duration::days(i64::from(u32::MAX)),
            ..Harness::settings()
        };

        let message = batch().compose(now(), &settings);

        assert!(message.body.starts_with("Following local Certificates"));
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let harness = Harness::new(now());
        let reminded = ReminderBatch::new()
            .flush(&harness.collab, &Harness::settings(), now())
            .await
            .unwrap();

        assert!(reminded.is_empty());
        assert!(harness.mailer.sent().is_empty());
    }
}

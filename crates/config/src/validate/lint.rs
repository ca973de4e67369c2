//! Configuration linting for best practices
//!
//! Checks configuration for settings that let the scheduler run but make
//! some of its actions fail or weaken the rollover guarantees.

use super::{ValidationResult, ValidationWarning};
use crate::Config;

/// Lint configuration for best practices
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    // Missing hooks turn the matching action into a per-certificate failure
    if config.hooks.issue.is_none() {
        result.add_warning(ValidationWarning::new(
            "No issue hook configured (ACME certificates cannot be renewed)",
        ));
    }
    if config.hooks.deploy.is_none() {
        result.add_warning(ValidationWarning::new(
            "No deploy hook configured (certificates cannot be distributed)",
        ));
    }
    if config.hooks.publish_tlsa.is_none() {
        result.add_warning(ValidationWarning::new(
            "No publish-tlsa hook configured (ACME rollovers cannot be prepublished)",
        ));
    }

    match config.mail {
        None => {
            result.add_warning(ValidationWarning::new(
                "No mail block configured (local certificate reminders cannot be sent)",
            ));
        }
        Some(ref mail) if mail.command.is_none() => {
            result.add_warning(ValidationWarning::new(
                "Mail block has no command (local certificate reminders cannot be sent)",
            ));
        }
        Some(_) => {}
    }

    let schedule = &config.schedule;

    // Resolvers may cache the old TLSA record for its TTL, typically a day
    // or more, before the new certificate is deployed.
    if schedule.pre_publish_window_days > 1 && schedule.pre_publish_window_days < 3 {
        result.add_warning(ValidationWarning::new(format!(
            "pre-publish-window-days is {} (TLSA records may still be cached at cutover)",
            schedule.pre_publish_window_days
        )));
    }

    if schedule.check_interval_hours > 24 {
        result.add_warning(ValidationWarning::new(format!(
            "check-interval-hours is {} (passes run less often than the 1 day expiry margin)",
            schedule.check_interval_hours
        )));
    }

    if schedule.reminder_lead_days <= schedule.pre_publish_window_days {
        result.add_warning(ValidationWarning::new(format!(
            "reminder-lead-days ({}) does not exceed pre-publish-window-days ({})",
            schedule.reminder_lead_days, schedule.pre_publish_window_days
        )));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HooksConfig, MailConfig};

    fn complete_config() -> Config {
        Config {
            hooks: HooksConfig {
                issue: Some("issue-acme".to_string()),
                deploy: Some("deploy-cert".to_string()),
                publish_tlsa: Some("publish-tlsa".to_string()),
                ..Default::default()
            },
            mail: Some(MailConfig {
                sender: "pki@example.org".to_string(),
                recipient: "hostmaster@example.org".to_string(),
                command: Some("sendmail -t -oi".to_string()),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_lint_complete_config() {
        let result = lint_config(&complete_config());
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    }

    #[test]
    fn test_lint_missing_hooks_and_mail() {
        let result = lint_config(&Config::default());

        assert!(result.is_valid());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("No deploy hook")));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("No mail block")));
    }

    #[test]
    fn test_lint_short_window() {
        let mut config = complete_config();
        config.schedule.pre_publish_window_days = 2;

        let result = lint_config(&config);

        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("cached at cutover"));
    }
}

//! Configuration validation
//!
//! Validation is split into hard errors (the scheduler cannot run
//! correctly) and warnings (the scheduler runs but some action will fail
//! or is discouraged).

mod hooks;
mod lint;

pub use hooks::validate_hooks;
pub use lint::lint_config;

use std::fmt;

use crate::Config;

/// Area of the configuration a validation error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Storage,
    Schedule,
    Hook,
    Mail,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Storage => "storage",
            ErrorCategory::Schedule => "schedule",
            ErrorCategory::Hook => "hook",
            ErrorCategory::Mail => "mail",
        };
        f.write_str(name)
    }
}

/// A validation failure that prevents the scheduler from running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Collected outcome of one or more validation passes
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Upper bound for day-valued schedule settings (ten years)
pub const MAX_SCHEDULE_DAYS: u32 = 3650;

/// Check values that the scheduler relies on
pub fn validate_values(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    let schedule = &config.schedule;

    // Deployed instances are replaced one day before expiry; a window of
    // one day or less never prepublishes.
    if schedule.pre_publish_window_days <= 1 {
        result.add_error(ValidationError::new(
            ErrorCategory::Schedule,
            format!(
                "pre-publish-window-days must be greater than 1, got {}",
                schedule.pre_publish_window_days
            ),
        ));
    }

    if schedule.reminder_lead_days == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Schedule,
            "reminder-lead-days must be at least 1",
        ));
    }

    for (key, days) in [
        ("pre-publish-window-days", schedule.pre_publish_window_days),
        ("reminder-lead-days", schedule.reminder_lead_days),
    ] {
        if days > MAX_SCHEDULE_DAYS {
            result.add_error(ValidationError::new(
                ErrorCategory::Schedule,
                format!("{} must be at most {}, got {}", key, MAX_SCHEDULE_DAYS, days),
            ));
        }
    }

    if schedule.check_interval_hours == 0 {
        result.add_error(ValidationError::new(
            ErrorCategory::Schedule,
            "check-interval-hours must be at least 1",
        ));
    }

    if config.storage.path.as_os_str().is_empty() {
        result.add_error(ValidationError::new(
            ErrorCategory::Storage,
            "storage path must not be empty",
        ));
    }

    if let Some(ref mail) = config.mail {
        for (field, address) in [("sender", &mail.sender), ("recipient", &mail.recipient)] {
            if !address.contains('@') {
                result.add_error(ValidationError::new(
                    ErrorCategory::Mail,
                    format!("mail {} '{}' is not an email address", field, address),
                ));
            }
        }
    }

    result
}

/// Run every validation pass and lint
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = validate_values(config);
    result.merge(validate_hooks(config));
    result.merge(lint_config(config));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MailConfig;

    #[test]
    fn test_default_config_values_valid() {
        let result = validate_values(&Config::default());
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_short_pre_publish_window_rejected() {
        let mut config = Config::default();
        config.schedule.pre_publish_window_days = 1;

        let result = validate_values(&config);

        assert!(!result.is_valid());
        assert_eq!(result.errors[0].category, ErrorCategory::Schedule);
    }

    #[test]
    fn test_oversized_schedule_days_rejected() {
        let mut config = Config::default();
        config.schedule.pre_publish_window_days = 100_000_000;
        config.schedule.reminder_lead_days = MAX_SCHEDULE_DAYS + 1;

        let result = validate_values(&config);

        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].message.contains("pre-publish-window-days"));
        assert!(result.errors[1].message.contains("reminder-lead-days"));
    }

    #[test]
    fn test_schedule_days_upper_bound_inclusive() {
        let mut config = Config::default();
        config.schedule.pre_publish_window_days = MAX_SCHEDULE_DAYS;
        config.schedule.reminder_lead_days = MAX_SCHEDULE_DAYS;

        assert!(validate_values(&config).is_valid());
    }

    #[test]
    fn test_bad_mail_address_rejected() {
        let config = Config {
            mail: Some(MailConfig {
                sender: "pki".to_string(),
                recipient: "hostmaster@example.org".to_string(),
                command: None,
            }),
            ..Default::default()
        };

        let result = validate_values(&config);

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("sender"));
    }
}

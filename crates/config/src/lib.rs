//! Configuration for the certwarden scheduler.
//!
//! Configuration is written in KDL:
//!
//! ```kdl
//! storage { path "/var/lib/certwarden" }
//! schedule {
//!     pre-publish-window-days 7
//!     reminder-lead-days 30
//!     check-interval-hours 24
//! }
//! hooks {
//!     issue "/usr/local/libexec/certwarden/issue-acme"
//!     deploy "/usr/local/libexec/certwarden/deploy"
//!     publish-tlsa "/usr/local/libexec/certwarden/publish-tlsa"
//!     timeout-secs 300
//! }
//! mail {
//!     sender "pki@example.org"
//!     recipient "hostmaster@example.org"
//!     command "/usr/sbin/sendmail -t -oi"
//! }
//! ```

mod kdl;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

/// Configuration used when no file is given
pub const DEFAULT_CONFIG: &str = r#"
storage {
    path "/var/lib/certwarden"
}

schedule {
    pre-publish-window-days 7
    reminder-lead-days 30
    check-interval-hours 24
}

hooks {
    timeout-secs 300
}

logging {
    format "pretty"
}
"#;

/// Complete scheduler configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    /// Reminder mail; without it local reminders are logged only
    #[serde(default)]
    pub mail: Option<MailConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where certificate and instance records are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Rollover timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// How long before expiry the TLSA dual publication starts
    #[serde(default = "default_pre_publish_window_days")]
    pub pre_publish_window_days: u32,
    /// Reminder lead time for local certificates, also the futility
    /// threshold for issued instances
    #[serde(default = "default_reminder_lead_days")]
    pub reminder_lead_days: u32,
    /// Time between passes in daemon mode
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            pre_publish_window_days: default_pre_publish_window_days(),
            reminder_lead_days: default_reminder_lead_days(),
            check_interval_hours: default_check_interval_hours(),
        }
    }
}

impl ScheduleConfig {
    pub fn pre_publish_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.pre_publish_window_days))
    }

    pub fn reminder_lead(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.reminder_lead_days))
    }

    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.check_interval_hours) * 3600)
    }
}

/// Shell commands carrying out the side effects of the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub deploy: Option<String>,
    #[serde(default)]
    pub publish_tlsa: Option<String>,
    #[serde(default = "default_hook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            issue: None,
            deploy: None,
            publish_tlsa: None,
            timeout_secs: default_hook_timeout_secs(),
        }
    }
}

impl HooksConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailConfig {
    pub sender: String,
    pub recipient: String,
    /// sendmail-compatible command reading the message on stdin
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default)]
    pub level: Option<String>,
}

pub(crate) fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/certwarden")
}

pub(crate) fn default_pre_publish_window_days() -> u32 {
    7
}

pub(crate) fn default_reminder_lead_days() -> u32 {
    30
}

pub(crate) fn default_check_interval_hours() -> u32 {
    24
}

pub(crate) fn default_hook_timeout_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config = Self::from_kdl(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from KDL source
    pub fn from_kdl(content: &str) -> Result<Self> {
        kdl::parse_kdl(content)
    }

    /// The embedded default configuration
    pub fn default_embedded() -> Result<Self> {
        debug!("Using embedded default configuration");
        Self::from_kdl(DEFAULT_CONFIG).context("Embedded default configuration is invalid")
    }

    /// Validate the configuration
    ///
    /// Returns the lint warnings when there are no errors; warnings are
    /// also logged.
    pub fn validate(&self) -> Result<Vec<ValidationWarning>> {
        let result = validate::validate_config(self);

        for warning in &result.warnings {
            warn!(warning = %warning, "Configuration warning");
        }

        if !result.is_valid() {
            let messages: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
            return Err(anyhow::anyhow!(
                "Configuration has {} error(s):\n  {}",
                messages.len(),
                messages.join("\n  ")
            ));
        }

        Ok(result.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_matches_defaults() {
        let embedded = Config::default_embedded().unwrap();
        assert_eq!(embedded, Config::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certwarden.kdl");
        std::fs::write(
            &path,
            r#"
            storage { path "/srv/certwarden" }
            schedule { pre-publish-window-days 5 }
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/srv/certwarden"));
        assert_eq!(config.schedule.pre_publish_window(), chrono::Duration::days(5));
        assert_eq!(config.schedule.reminder_lead(), chrono::Duration::days(30));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file("/nonexistent/certwarden.kdl").unwrap_err();
        assert!(err.to_string().contains("Failed to read configuration file"));
    }

    #[test]
    fn test_validate_reports_errors() {
        let mut config = Config::default();
        config.schedule.check_interval_hours = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("check-interval-hours"));
    }

    #[test]
    fn test_validate_rejects_oversized_window() {
        let config = Config::from_kdl(
            r#"
            storage { path "/srv/certwarden" }
            schedule { pre-publish-window-days 100000000 }
            "#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pre-publish-window-days must be at most 3650"));
    }

    #[test]
    fn test_validate_returns_warnings() {
        let warnings = Config::default().validate().unwrap();
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_check_interval() {
        let schedule = ScheduleConfig {
            check_interval_hours: 12,
            ..Default::default()
        };
        assert_eq!(schedule.check_interval().as_secs(), 12 * 3600);
    }
}

//! Storage, schedule and logging KDL parsing.

use anyhow::Result;
use std::path::PathBuf;
use tracing::trace;

use crate::{
    default_check_interval_hours, default_pre_publish_window_days, default_reminder_lead_days,
    default_storage_path, LogFormat, LoggingConfig, ScheduleConfig, StorageConfig,
};

use super::helpers::{get_string_entry, get_u32_entry};

/// Parse storage configuration block
pub fn parse_storage_config(node: &kdl::KdlNode) -> Result<StorageConfig> {
    trace!("Parsing storage configuration block");

    let path = get_string_entry(node, "path")
        .map(PathBuf::from)
        .unwrap_or_else(default_storage_path);

    trace!(path = %path.display(), "Parsed storage configuration");

    Ok(StorageConfig { path })
}

/// Parse schedule configuration block
pub fn parse_schedule_config(node: &kdl::KdlNode) -> Result<ScheduleConfig> {
    trace!("Parsing schedule configuration block");

    let config = ScheduleConfig {
        pre_publish_window_days: get_u32_entry(node, "pre-publish-window-days")?
            .unwrap_or_else(default_pre_publish_window_days),
        reminder_lead_days: get_u32_entry(node, "reminder-lead-days")?
            .unwrap_or_else(default_reminder_lead_days),
        check_interval_hours: get_u32_entry(node, "check-interval-hours")?
            .unwrap_or_else(default_check_interval_hours),
    };

    trace!(
        pre_publish_window_days = config.pre_publish_window_days,
        reminder_lead_days = config.reminder_lead_days,
        check_interval_hours = config.check_interval_hours,
        "Parsed schedule configuration"
    );

    Ok(config)
}

/// Parse logging configuration block
pub fn parse_logging_config(node: &kdl::KdlNode) -> Result<LoggingConfig> {
    trace!("Parsing logging configuration block");

    let format = match get_string_entry(node, "format")
        .unwrap_or_else(|| "pretty".to_string())
        .to_lowercase()
        .as_str()
    {
        "pretty" | "text" => LogFormat::Pretty,
        "json" => LogFormat::Json,
        other => {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Valid formats: pretty, json",
                other
            ));
        }
    };

    Ok(LoggingConfig {
        format,
        level: get_string_entry(node, "level"),
    })
}

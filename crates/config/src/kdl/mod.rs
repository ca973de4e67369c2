//! KDL configuration parsing.

mod helpers;
mod hooks;
mod schedule;

use anyhow::Result;
use kdl::KdlDocument;
use tracing::{debug, warn};

use crate::Config;

use self::hooks::{parse_hooks_config, parse_mail_config};
use self::schedule::{parse_logging_config, parse_schedule_config, parse_storage_config};

const TOP_LEVEL_BLOCKS: &str = "storage, schedule, hooks, mail, logging";

/// Parse a KDL document into a [`Config`]
///
/// Blocks that are absent keep their defaults. Parse errors are rendered
/// with source spans.
pub fn parse_kdl(content: &str) -> Result<Config> {
    let doc: KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        anyhow::anyhow!("{:?}", miette::Report::new(e))
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "storage" => config.storage = parse_storage_config(node)?,
            "schedule" => config.schedule = parse_schedule_config(node)?,
            "hooks" => config.hooks = parse_hooks_config(node)?,
            "mail" => config.mail = Some(parse_mail_config(node)?),
            "logging" => config.logging = parse_logging_config(node)?,
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown configuration block '{}'. Valid blocks: {}",
                    other,
                    TOP_LEVEL_BLOCKS
                ));
            }
        }

        let unknown: Vec<&str> = helpers::child_names(node)
            .into_iter()
            .filter(|name| !known_keys(node.name().value()).contains(name))
            .collect();
        if !unknown.is_empty() {
            warn!(
                block = node.name().value(),
                keys = ?unknown,
                "Ignoring unknown configuration keys"
            );
        }
    }

    debug!(
        storage = %config.storage.path.display(),
        mail = config.mail.is_some(),
        "Parsed KDL configuration"
    );

    Ok(config)
}

fn known_keys(block: &str) -> &'static [&'static str] {
    match block {
        "storage" => &["path"],
        "schedule" => &[
            "pre-publish-window-days",
            "reminder-lead-days",
            "check-interval-hours",
        ],
        "hooks" => &["issue", "deploy", "publish-tlsa", "timeout-secs"],
        "mail" => &["sender", "recipient", "command"],
        "logging" => &["format", "level"],
        _ => &[],
    }
}

//! Hook and mail KDL parsing.

use anyhow::Result;
use tracing::trace;

use crate::{default_hook_timeout_secs, HooksConfig, MailConfig};

use super::helpers::{get_string_entry, get_u32_entry};

/// Parse hooks configuration block
///
/// Every hook is a shell command line; a missing hook means the matching
/// action cannot be carried out and is reported as a failure at run time.
pub fn parse_hooks_config(node: &kdl::KdlNode) -> Result<HooksConfig> {
    trace!("Parsing hooks configuration block");

    let config = HooksConfig {
        issue: get_string_entry(node, "issue"),
        deploy: get_string_entry(node, "deploy"),
        publish_tlsa: get_string_entry(node, "publish-tlsa"),
        timeout_secs: get_u32_entry(node, "timeout-secs")?
            .map(u64::from)
            .unwrap_or_else(default_hook_timeout_secs),
    };

    trace!(
        issue = config.issue.is_some(),
        deploy = config.deploy.is_some(),
        publish_tlsa = config.publish_tlsa.is_some(),
        timeout_secs = config.timeout_secs,
        "Parsed hooks configuration"
    );

    Ok(config)
}

/// Parse mail configuration block
pub fn parse_mail_config(node: &kdl::KdlNode) -> Result<MailConfig> {
    trace!("Parsing mail configuration block");

    let sender = get_string_entry(node, "sender").ok_or_else(|| {
        anyhow::anyhow!("Mail block requires a 'sender' field, e.g., sender \"pki@example.org\"")
    })?;
    let recipient = get_string_entry(node, "recipient").ok_or_else(|| {
        anyhow::anyhow!(
            "Mail block requires a 'recipient' field, e.g., recipient \"hostmaster@example.org\""
        )
    })?;

    Ok(MailConfig {
        sender,
        recipient,
        command: get_string_entry(node, "command"),
    })
}

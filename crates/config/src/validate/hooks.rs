//! Hook command validation
//!
//! Checks that hook programs given as absolute paths exist and are
//! executable. Commands resolved through `PATH` are left to the shell.

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::Config;
use std::path::Path;

/// Validate configured hook commands
pub fn validate_hooks(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let hooks = [
        ("issue", config.hooks.issue.as_deref()),
        ("deploy", config.hooks.deploy.as_deref()),
        ("publish-tlsa", config.hooks.publish_tlsa.as_deref()),
        (
            "mail",
            config.mail.as_ref().and_then(|m| m.command.as_deref()),
        ),
    ];

    for (name, command) in hooks {
        let Some(command) = command else {
            continue;
        };

        if let Err(e) = check_command(command) {
            result.add_error(ValidationError::new(
                ErrorCategory::Hook,
                format!("{} hook: {}", name, e),
            ));
        }
    }

    result
}

/// Check the program part of a shell command line
fn check_command(command: &str) -> Result<(), String> {
    let program = command
        .split_whitespace()
        .next()
        .ok_or_else(|| "command is empty".to_string())?;

    let path = Path::new(program);
    if !path.is_absolute() {
        return Ok(());
    }

    let metadata =
        std::fs::metadata(path).map_err(|e| format!("program not found: {:?}: {}", path, e))?;

    if !metadata.is_file() {
        return Err(format!("program is not a file: {:?}", path));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(format!("program is not executable: {:?}", path));
        }
    }

    Ok(())
}

//! Post-renewal command
//!
//! Typically something like `systemctl reload nginx`. The command line is
//! split on whitespace; no shell is involved, so quoting and pipes are not
//! interpreted.

use std::process::Command;

use tracing::{info, warn};

use crate::acme::AcmeError;

/// Run `command_line` and wait for it to finish
///
/// A blank command line does nothing. A non-zero exit status is an error.
pub fn run_post_command(command_line: &str) -> Result<(), AcmeError> {
    let mut parts = command_line.split_whitespace();
    let Some(program) = parts.next() else {
        return Ok(());
    };
    let args: Vec<&str> = parts.collect();

    info!(program = %program, args = ?args, "Running post-renewal command");
    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| AcmeError::Hook(format!("Failed to start '{}': {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            program = %program,
            status = %output.status,
            stderr = %stderr.trim(),
            "Post-renewal command failed"
        );
        return Err(AcmeError::Hook(format!(
            "'{}' exited with {}",
            command_line.trim(),
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        info!(output = %stdout.trim(), "Post-renewal command output");
    }
    Ok(())
}

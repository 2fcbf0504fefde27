// SPDX-License-Identifier: GPL-3.0-only

//! External tool invocation helpers
//!
//! Every destructive operation in this crate funnels through these two
//! functions, so the full command line of each call is visible at debug
//! level.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::{Result, SysError};

pub fn run_capture(command: &str, args: &[&str]) -> Result<String> {
    tracing::debug!(command, ?args, "running external tool");

    let output = Command::new(command).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SysError::OperationFailed(format!(
            "{command} failed: {stderr}"
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Like [`run_capture`], but feeds `stdin` to the child. Used for sfdisk
/// scripts and for passing LUKS passphrases without touching the disk or
/// the process argument list.
pub fn run_with_stdin(command: &str, args: &[&str], stdin: &[u8]) -> Result<String> {
    tracing::debug!(command, ?args, "running external tool (with stdin)");

    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    child
        .stdin
        .as_mut()
        .ok_or_else(|| SysError::OperationFailed(format!("{command}: stdin unavailable")))?
        .write_all(stdin)?;

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SysError::OperationFailed(format!(
            "{command} failed: {stderr}"
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a tool where a non-zero exit is an answer, not a failure
/// (e.g. `cryptsetup isLuks`, `mdadm --examine`).
pub fn run_query(command: &str, args: &[&str]) -> Result<Option<String>> {
    tracing::debug!(command, ?args, "querying external tool");

    let output = Command::new(command).args(args).output()?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
}

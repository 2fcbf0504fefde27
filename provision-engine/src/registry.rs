// SPDX-License-Identifier: GPL-3.0-only

//! Persistent registries
//!
//! Two append-only text files record what was provisioned: a
//! crypttab-equivalent for encrypted volumes and an mdadm.conf-equivalent
//! for arrays. Writing the same line twice is suppressed; the RAID
//! registry additionally refuses a same-device entry whose content
//! differs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};

fn existing_lines(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// crypttab-equivalent registry: `name identifier keyfile-or-dash luks`.
#[derive(Debug)]
pub struct CryptRegistry {
    path: PathBuf,
}

impl CryptRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry unless the identical line is already present.
    pub fn append(&mut self, line: &str) -> Result<()> {
        if existing_lines(&self.path)?.iter().any(|have| have == line) {
            tracing::debug!(line, "crypt registry entry already present");
            return Ok(());
        }
        append_line(&self.path, line)
    }
}

/// mdadm.conf-equivalent registry: one `ARRAY <device> ...` line per
/// array.
#[derive(Debug)]
pub struct RaidRegistry {
    path: PathBuf,
}

impl RaidRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one descriptor line. An identical line is suppressed; a
    /// line for the same array device with different content is a
    /// conflict and raises.
    pub fn append(&mut self, device: &str, line: &str) -> Result<()> {
        let prefix = format!("ARRAY {device} ");
        for have in existing_lines(&self.path)? {
            if have == line {
                tracing::debug!(device, "raid registry entry already present");
                return Ok(());
            }
            if have.starts_with(&prefix) || have == format!("ARRAY {device}") {
                return Err(ProvisionError::RegistryConflict {
                    device: device.to_string(),
                });
            }
        }
        append_line(&self.path, line)
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Live mount table access
//!
//! `/proc/self/mountinfo` is the single source of truth for "is this
//! device mounted": the engine re-derives mount state from here instead of
//! trusting in-memory booleans. Comparison is exact on canonical paths.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cmd::run_capture;
use crate::{Result, SysError};

/// One row of the live mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: PathBuf,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

pub fn live_mounts() -> Result<Vec<MountEntry>> {
    let mount_info = fs::read_to_string("/proc/self/mountinfo")?;
    parse_mounts(&mount_info)
}

pub fn parse_mounts(input: &str) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let (left, right) = line
            .split_once(" - ")
            .ok_or_else(|| SysError::ParseFailed(format!("mountinfo line: {line}")))?;

        let mount_point = left
            .split_whitespace()
            .nth(4)
            .ok_or_else(|| SysError::ParseFailed(format!("mountinfo line: {line}")))?;

        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields
            .next()
            .ok_or_else(|| SysError::ParseFailed(format!("mountinfo line: {line}")))?;
        let source = right_fields
            .next()
            .ok_or_else(|| SysError::ParseFailed(format!("mountinfo line: {line}")))?;

        entries.push(MountEntry {
            source: PathBuf::from(unescape_mount_field(source)),
            mount_point: PathBuf::from(unescape_mount_field(mount_point)),
            fs_type: fs_type.to_string(),
        });
    }

    Ok(entries)
}

/// Exact canonical-path comparison against every mount source. Prefix
/// matching is deliberately not used; partition children are the caller's
/// responsibility to enumerate.
pub fn is_device_mounted(device: &Path) -> Result<bool> {
    let device = canonical_or_same(device);
    let mounts = live_mounts()?;
    Ok(mounts
        .iter()
        .any(|entry| canonical_or_same(&entry.source) == device))
}

/// Mount points whose source is exactly the given device.
pub fn mount_points_of(device: &Path) -> Result<Vec<PathBuf>> {
    let device = canonical_or_same(device);
    Ok(live_mounts()?
        .into_iter()
        .filter(|entry| canonical_or_same(&entry.source) == device)
        .map(|entry| entry.mount_point)
        .collect())
}

fn canonical_or_same(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn mount(device: &Path, target: &Path, fstype: Option<&str>, options: Option<&str>) -> Result<()> {
    let device = device.display().to_string();
    let target = target.display().to_string();

    let mut args: Vec<&str> = Vec::new();
    if let Some(fstype) = fstype {
        args.push("-t");
        args.push(fstype);
    }
    if let Some(options) = options {
        args.push("-o");
        args.push(options);
    }
    args.push(&device);
    args.push(&target);

    run_capture("mount", &args)?;
    Ok(())
}

/// Unmount a target. `lazy` detaches immediately and finishes teardown
/// when the filesystem stops being busy; `force` unmounts even a busy or
/// unresponsive filesystem.
pub fn unmount(target: &Path, lazy: bool, force: bool) -> Result<()> {
    let target = target.display().to_string();

    let mut args: Vec<&str> = Vec::new();
    if lazy {
        args.push("-l");
    }
    if force {
        args.push("-f");
    }
    args.push(&target);

    run_capture("umount", &args)?;
    Ok(())
}

fn unescape_mount_field(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1].is_ascii_digit()
            && bytes[index + 2].is_ascii_digit()
            && bytes[index + 3].is_ascii_digit()
        {
            let octal = &value[index + 1..index + 4];
            if let Ok(num) = u8::from_str_radix(octal, 8) {
                output.push(num as char);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index] as char);
        index += 1;
    }

    output
}

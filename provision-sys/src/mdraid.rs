// SPDX-License-Identifier: GPL-3.0-only

//! mdadm operations

use std::path::{Path, PathBuf};

use crate::cmd::{run_capture, run_query};
use crate::Result;

/// Parameters for `mdadm --create`.
#[derive(Debug, Clone)]
pub struct CreateArray<'a> {
    pub device: &'a Path,
    pub level: u32,
    pub metadata: &'a str,
    /// Chunk size in KiB; ignored by mdadm for mirror-only levels.
    pub chunk: Option<u32>,
    pub layout: Option<&'a str>,
    pub name: Option<&'a str>,
    pub homehost: Option<&'a str>,
    pub members: &'a [PathBuf],
}

/// Superblock metadata parsed from `mdadm --examine`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuperblockInfo {
    pub array_uuid: Option<String>,
    pub name: Option<String>,
    pub level: Option<String>,
    pub version: Option<String>,
    pub raid_devices: Option<u32>,
}

pub fn raid_create(array: &CreateArray<'_>) -> Result<()> {
    let device = array.device.display().to_string();
    let level = format!("--level={}", array.level);
    let metadata = format!("--metadata={}", array.metadata);
    let count = format!("--raid-devices={}", array.members.len());

    let mut args: Vec<String> = vec![
        "--create".to_string(),
        device,
        "--run".to_string(),
        level,
        metadata,
        count,
    ];
    if let Some(chunk) = array.chunk {
        args.push(format!("--chunk={chunk}"));
    }
    if let Some(layout) = array.layout {
        args.push(format!("--layout={layout}"));
    }
    if let Some(name) = array.name {
        args.push(format!("--name={name}"));
    }
    if let Some(homehost) = array.homehost {
        args.push(format!("--homehost={homehost}"));
    }
    for member in array.members {
        args.push(member.display().to_string());
    }

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run_capture("mdadm", &args)?;
    Ok(())
}

/// Assemble an array from an explicit member list.
pub fn raid_assemble(device: &Path, members: &[PathBuf]) -> Result<()> {
    let mut args: Vec<String> = vec!["--assemble".to_string(), device.display().to_string()];
    for member in members {
        args.push(member.display().to_string());
    }
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run_capture("mdadm", &args)?;
    Ok(())
}

/// Assemble via superblock scan discovery.
pub fn raid_assemble_scan(device: &Path) -> Result<()> {
    run_capture(
        "mdadm",
        &["--assemble", "--scan", &device.display().to_string()],
    )?;
    Ok(())
}

pub fn raid_stop(device: &Path) -> Result<()> {
    run_capture("mdadm", &["--stop", &device.display().to_string()])?;
    Ok(())
}

/// Destructively erase a member's superblock.
pub fn zero_superblock(member: &Path) -> Result<()> {
    tracing::warn!(member = %member.display(), "zeroing RAID superblock");
    run_capture(
        "mdadm",
        &["--zero-superblock", &member.display().to_string()],
    )?;
    Ok(())
}

/// Probe a device for a RAID superblock. `None` when the device carries
/// none (mdadm exits non-zero in that case).
pub fn examine(member: &Path) -> Result<Option<SuperblockInfo>> {
    let Some(output) = run_query("mdadm", &["--examine", &member.display().to_string()])? else {
        return Ok(None);
    };
    Ok(Some(parse_examine(&output)))
}

fn parse_examine(output: &str) -> SuperblockInfo {
    let mut info = SuperblockInfo::default();

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "Array UUID" | "UUID" => info.array_uuid = Some(value.to_string()),
            // "Name : host:0  (local to host ...)" keeps only the name.
            "Name" => {
                info.name = Some(
                    value
                        .split("  ")
                        .next()
                        .unwrap_or(value)
                        .trim()
                        .to_string(),
                )
            }
            "Raid Level" => info.level = Some(value.to_string()),
            "Version" => info.version = Some(value.to_string()),
            "Raid Devices" => info.raid_devices = value.parse().ok(),
            _ => {}
        }
    }

    info
}

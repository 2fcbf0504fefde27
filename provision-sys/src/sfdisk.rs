// SPDX-License-Identifier: GPL-3.0-only

//! sfdisk backend
//!
//! Fallback backend built on util-linux: `sfdisk` script input for table
//! and partition creation, `sfdisk --json` for listing, `blockdev` for
//! geometry. Flag vocabulary is much narrower than parted's; anything
//! sfdisk cannot express is reported as untranslatable and dropped by the
//! caller.

use std::path::Path;

use serde::Deserialize;

use provision_types::{
    DiskGeometry, FilesystemType, PartitionFlag, PartitionRole, TableKind,
};

use crate::cmd::{run_capture, run_query, run_with_stdin};
use crate::provider::{BlockProvider, PartitionEntry, PartitionSpec};
use crate::{Result, SysError};

#[derive(Debug, Default)]
pub struct SfdiskBackend;

impl SfdiskBackend {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Deserialize)]
struct SfdiskDump {
    partitiontable: SfdiskTable,
}

#[derive(Debug, Deserialize)]
struct SfdiskTable {
    label: String,

    #[serde(default)]
    partitions: Vec<SfdiskPartition>,
}

#[derive(Debug, Deserialize)]
struct SfdiskPartition {
    node: String,
    start: u64,
    size: u64,

    #[serde(rename = "type")]
    type_code: String,
}

fn parse_json_dump(output: &str) -> Result<SfdiskDump> {
    serde_json::from_str(output).map_err(|err| SysError::ParseFailed(format!("sfdisk json: {err}")))
}

fn partition_number(node: &str) -> Option<u32> {
    let digits: String = node
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.chars().rev().collect::<String>().parse().ok()
}

/// MBR type codes / GPT type GUIDs per filesystem.
fn type_code(kind: TableKind, fstype: FilesystemType, role: PartitionRole) -> &'static str {
    match kind {
        TableKind::Msdos => match role {
            PartitionRole::Extended => "05",
            _ => match fstype {
                FilesystemType::Swap => "82",
                FilesystemType::Vfat => "0c",
                _ => "83",
            },
        },
        TableKind::Gpt => match fstype {
            FilesystemType::Swap => "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F",
            FilesystemType::Vfat => "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7",
            _ => "0FC63DAF-8483-4772-8E79-3D69D8477DE4",
        },
    }
}

impl BlockProvider for SfdiskBackend {
    fn name(&self) -> &'static str {
        "sfdisk"
    }

    fn device_geometry(&self, device: &Path) -> Result<DiskGeometry> {
        let device = device.display().to_string();
        // blockdev --getsz always counts 512-byte units.
        let size_512 = run_capture("blockdev", &["--getsz", &device])?;
        let sector_size = run_capture("blockdev", &["--getss", &device])?;

        let size_512: u64 = size_512
            .trim()
            .parse()
            .map_err(|_| SysError::ParseFailed(format!("blockdev --getsz: {size_512}")))?;
        let sector_size: u64 = sector_size
            .trim()
            .parse()
            .map_err(|_| SysError::ParseFailed(format!("blockdev --getss: {sector_size}")))?;

        Ok(DiskGeometry {
            total_sectors: size_512 * 512 / sector_size,
            sector_size,
        })
    }

    fn probe_table(&self, device: &Path) -> Result<Option<TableKind>> {
        let Some(output) = run_query("sfdisk", &["--json", &device.display().to_string()])? else {
            return Ok(None);
        };
        let dump = parse_json_dump(&output)?;
        Ok(TableKind::parse(&dump.partitiontable.label).ok())
    }

    fn write_table(&self, device: &Path, kind: TableKind) -> Result<()> {
        let label = match kind {
            TableKind::Gpt => "gpt",
            TableKind::Msdos => "dos",
        };
        run_with_stdin(
            "sfdisk",
            &[&device.display().to_string()],
            format!("label: {label}\n").as_bytes(),
        )?;
        Ok(())
    }

    fn add_partition(&self, device: &Path, kind: TableKind, spec: &PartitionSpec) -> Result<()> {
        let mut line = format!(
            "start={}, size={}, type={}",
            spec.range.start,
            spec.range.end - spec.range.start + 1,
            type_code(kind, spec.fstype, spec.role),
        );
        if kind == TableKind::Gpt {
            if let Some(name) = &spec.name {
                line.push_str(&format!(", name={name}"));
            }
        }
        line.push('\n');

        run_with_stdin(
            "sfdisk",
            &["--append", &device.display().to_string()],
            line.as_bytes(),
        )?;
        Ok(())
    }

    fn flag_name(&self, flag: PartitionFlag) -> Option<&'static str> {
        // sfdisk only toggles the MBR bootable bit; everything else is
        // carried in the partition type and has no separate flag.
        match flag {
            PartitionFlag::Boot => Some("bootable"),
            _ => None,
        }
    }

    fn set_flag(&self, device: &Path, number: u32, flag: PartitionFlag) -> Result<()> {
        if self.flag_name(flag).is_none() {
            return Err(SysError::OperationFailed(format!(
                "flag {} has no sfdisk equivalent",
                flag.as_str()
            )));
        }
        run_capture(
            "sfdisk",
            &[
                "--activate",
                &device.display().to_string(),
                &number.to_string(),
            ],
        )?;
        Ok(())
    }

    fn list_partitions(&self, device: &Path) -> Result<Vec<PartitionEntry>> {
        let output = run_query("sfdisk", &["--json", &device.display().to_string()])?
            .ok_or_else(|| SysError::DeviceNotFound(device.display().to_string()))?;
        let dump = parse_json_dump(&output)?;

        Ok(dump
            .partitiontable
            .partitions
            .iter()
            .filter_map(|partition| {
                Some(PartitionEntry {
                    number: partition_number(&partition.node)?,
                    start: partition.start,
                    end: partition.start + partition.size - 1,
                    type_code: partition.type_code.clone(),
                })
            })
            .collect())
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! parted backend
//!
//! Drives parted through its machine-readable interface (`--machine
//! --script`). Output rows are colon-separated and `;`-terminated; sector
//! fields carry an `s` suffix.

use std::path::Path;

use provision_types::{DiskGeometry, PartitionFlag, PartitionRole, TableKind};

use crate::cmd::{run_capture, run_query};
use crate::provider::{BlockProvider, PartitionEntry, PartitionSpec};
use crate::{Result, SysError};

#[derive(Debug, Default)]
pub struct PartedBackend;

impl PartedBackend {
    pub fn new() -> Self {
        Self
    }

    fn print_machine(&self, device: &Path) -> Result<Option<String>> {
        run_query(
            "parted",
            &[
                "--machine",
                "--script",
                &device.display().to_string(),
                "unit",
                "s",
                "print",
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MachineHeader {
    total_sectors: u64,
    logical_sector_size: u64,
    table: String,
}

fn strip_sectors(field: &str) -> Option<u64> {
    field.strip_suffix('s')?.parse().ok()
}

fn parse_machine_header(output: &str) -> Result<MachineHeader> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("/dev/"))
        .ok_or_else(|| SysError::ParseFailed("no device row in parted output".to_string()))?;

    let line = line.trim_end_matches(';');
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 6 {
        return Err(SysError::ParseFailed(format!("short device row: {line}")));
    }

    let total_sectors = strip_sectors(fields[1])
        .ok_or_else(|| SysError::ParseFailed(format!("bad sector count: {}", fields[1])))?;
    let logical_sector_size = fields[3]
        .parse()
        .map_err(|_| SysError::ParseFailed(format!("bad sector size: {}", fields[3])))?;

    Ok(MachineHeader {
        total_sectors,
        logical_sector_size,
        table: fields[5].to_string(),
    })
}

fn parse_machine_partitions(output: &str) -> Vec<PartitionEntry> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim().trim_end_matches(';');
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 5 {
                return None;
            }

            let number: u32 = fields[0].parse().ok()?;
            let start = strip_sectors(fields[1])?;
            let end = strip_sectors(fields[2])?;

            Some(PartitionEntry {
                number,
                start,
                end,
                type_code: fields[4].to_string(),
            })
        })
        .collect()
}

impl BlockProvider for PartedBackend {
    fn name(&self) -> &'static str {
        "parted"
    }

    fn device_geometry(&self, device: &Path) -> Result<DiskGeometry> {
        let output = self
            .print_machine(device)?
            .ok_or_else(|| SysError::DeviceNotFound(device.display().to_string()))?;
        let header = parse_machine_header(&output)?;
        Ok(DiskGeometry {
            total_sectors: header.total_sectors,
            sector_size: header.logical_sector_size,
        })
    }

    fn probe_table(&self, device: &Path) -> Result<Option<TableKind>> {
        let Some(output) = self.print_machine(device)? else {
            return Ok(None);
        };
        let header = parse_machine_header(&output)?;
        Ok(TableKind::parse(&header.table).ok())
    }

    fn write_table(&self, device: &Path, kind: TableKind) -> Result<()> {
        run_capture(
            "parted",
            &[
                "--script",
                &device.display().to_string(),
                "mklabel",
                kind.as_str(),
            ],
        )?;
        Ok(())
    }

    fn add_partition(&self, device: &Path, kind: TableKind, spec: &PartitionSpec) -> Result<()> {
        let device = device.display().to_string();
        let start = format!("{}s", spec.range.start);
        let end = format!("{}s", spec.range.end);

        // GPT mkpart takes a partition name in the role position; MBR
        // takes the slot role. Extended slots carry no filesystem code.
        let mut args = vec![
            "--script",
            "--align",
            "optimal",
            device.as_str(),
            "unit",
            "s",
            "mkpart",
        ];

        let name;
        match kind {
            TableKind::Gpt => {
                name = spec
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("partition{}", spec.number));
                args.push(&name);
                args.push(spec.fstype.parted_code());
            }
            TableKind::Msdos => {
                args.push(spec.role.as_str());
                if spec.role != PartitionRole::Extended {
                    args.push(spec.fstype.parted_code());
                }
            }
        }
        args.push(&start);
        args.push(&end);

        run_capture("parted", &args)?;
        Ok(())
    }

    fn flag_name(&self, flag: PartitionFlag) -> Option<&'static str> {
        // parted speaks the canonical vocabulary directly.
        Some(match flag {
            PartitionFlag::Boot => "boot",
            PartitionFlag::Esp => "esp",
            PartitionFlag::BiosGrub => "bios_grub",
            PartitionFlag::Swap => "swap",
            PartitionFlag::Raid => "raid",
            PartitionFlag::Lvm => "lvm",
            PartitionFlag::Hidden => "hidden",
            PartitionFlag::LegacyBoot => "legacy_boot",
        })
    }

    fn set_flag(&self, device: &Path, number: u32, flag: PartitionFlag) -> Result<()> {
        let flag_name = self.flag_name(flag).ok_or_else(|| {
            SysError::OperationFailed(format!("flag {} has no parted name", flag.as_str()))
        })?;
        run_capture(
            "parted",
            &[
                "--script",
                &device.display().to_string(),
                "set",
                &number.to_string(),
                flag_name,
                "on",
            ],
        )?;
        Ok(())
    }

    fn list_partitions(&self, device: &Path) -> Result<Vec<PartitionEntry>> {
        let output = self
            .print_machine(device)?
            .ok_or_else(|| SysError::DeviceNotFound(device.display().to_string()))?;
        Ok(parse_machine_partitions(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BYT;\n\
        /dev/sda:41943040s:scsi:512:512:gpt:QEMU HARDDISK:;\n\
        1:2048s:1050623s:1048576s:fat32:esp:boot, esp;\n\
        2:1050624s:41940991s:40890368s:ext4:root:;\n";

    #[test]
    fn parses_machine_header() {
        let header = parse_machine_header(SAMPLE).expect("header");
        assert_eq!(
            header,
            MachineHeader {
                total_sectors: 41_943_040,
                logical_sector_size: 512,
                table: "gpt".to_string(),
            }
        );
    }

    #[test]
    fn parses_partition_rows() {
        let partitions = parse_machine_partitions(SAMPLE);
        assert_eq!(partitions.len(), 2);
        assert_eq!(
            partitions[0],
            PartitionEntry {
                number: 1,
                start: 2048,
                end: 1_050_623,
                type_code: "fat32".to_string(),
            }
        );
        assert_eq!(partitions[1].number, 2);
    }

    #[test]
    fn unlabeled_disk_reports_no_table() {
        let output = "BYT;\n/dev/sdb:1000s:scsi:512:512:unknown:disk:;\n";
        let header = parse_machine_header(output).expect("header");
        assert!(TableKind::parse(&header.table).is_err());
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Partition table management
//!
//! A [`Disk`] owns its declared partitions and drives the provider to
//! write the table and commit the partition set. Both operations are
//! guarded against running while the disk or any of its partitions is
//! mounted.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use provision_sys::{BlockProvider, PartitionSpec};
use provision_types::{
    resolve_range, DiskConfig, FilesystemType, PartitionFlag, PartitionRole, SectorRange,
    SizeSpec, TableKind, ValidationError,
};

use crate::device::{ensure_not_mounted, partition_device_path, BlockDevice};
use crate::error::{ProvisionError, Result};

#[derive(Debug)]
pub struct Partition {
    id: String,
    /// 1-based position on the disk.
    number: u32,
    start: SizeSpec,
    stop: SizeSpec,
    fstype: FilesystemType,
    flags: Vec<PartitionFlag>,
    name: Option<String>,
    role: PartitionRole,
    resolved: Option<SectorRange>,
    path: PathBuf,
}

impl Partition {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn fstype(&self) -> FilesystemType {
        self.fstype
    }

    pub fn role(&self) -> PartitionRole {
        self.role
    }

    pub fn resolved(&self) -> Option<SectorRange> {
        self.resolved
    }
}

impl BlockDevice for Partition {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_ready(&self) -> bool {
        self.resolved.is_some()
    }
}

/// MBR slot role by declared position. With four or fewer partitions all
/// are primary; beyond that the fourth slot becomes the extended
/// container and everything after it is logical.
fn mbr_role(number: u32, total: usize) -> PartitionRole {
    if total <= 4 {
        PartitionRole::Primary
    } else if number < 4 {
        PartitionRole::Primary
    } else if number == 4 {
        PartitionRole::Extended
    } else {
        PartitionRole::Logical
    }
}

#[derive(Debug)]
pub struct Disk {
    device: PathBuf,
    table: TableKind,
    partitions: Vec<Partition>,
    table_written: bool,
    partitioned: bool,
    /// The committed partition set no longer matches the on-disk table
    /// (the table was rewritten after a commit).
    stale: bool,
}

impl Disk {
    pub fn from_config(config: &DiskConfig) -> Result<Self> {
        if config.table == TableKind::Gpt && config.partitions.len() > config.table.max_slots() {
            return Err(ValidationError::TooManyPartitions {
                count: config.partitions.len(),
                table: config.table.to_string(),
                max: config.table.max_slots(),
            }
            .into());
        }

        let total = config.partitions.len();
        let partitions = config
            .partitions
            .iter()
            .enumerate()
            .map(|(index, part)| {
                let number = index as u32 + 1;
                Partition {
                    id: part.id.clone(),
                    number,
                    start: part.start,
                    stop: part.stop,
                    fstype: part.fstype,
                    flags: part.flags.clone(),
                    name: part.name.clone(),
                    role: match config.table {
                        TableKind::Gpt => PartitionRole::Primary,
                        TableKind::Msdos => mbr_role(number, total),
                    },
                    resolved: None,
                    path: partition_device_path(&config.device, number),
                }
            })
            .collect();

        Ok(Self {
            device: config.device.clone(),
            table: config.table,
            partitions,
            table_written: false,
            partitioned: false,
            stale: false,
        })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn table(&self) -> TableKind {
        self.table
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition_path(&self, id: &str) -> Option<&Path> {
        self.partitions
            .iter()
            .find(|part| part.id == id)
            .map(|part| part.path.as_path())
    }

    fn guard_paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.device.as_path())
            .chain(self.partitions.iter().map(|part| part.path.as_path()))
    }

    /// Write an empty partition table of the configured kind.
    ///
    /// Idempotent against the device, not just this process: when a table
    /// of the same kind already exists the write is skipped and the flag
    /// set, so a re-run does not destroy a previous pass's work. The
    /// in-memory flag is only a same-run cache.
    pub fn write_table(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.table_written {
            tracing::debug!(device = %self.device.display(), "table already written this run");
            return Ok(());
        }

        ensure_not_mounted(provider, self.guard_paths())?;

        if provider.probe_table(&self.device)? == Some(self.table) {
            tracing::info!(
                device = %self.device.display(),
                table = %self.table,
                "existing table of requested kind, not rewriting"
            );
            self.table_written = true;
            return Ok(());
        }

        tracing::info!(device = %self.device.display(), table = %self.table, "writing partition table");
        provider.write_table(&self.device, self.table)?;
        if self.partitioned {
            self.stale = true;
        }
        self.table_written = true;
        Ok(())
    }

    /// Resolve geometry and create every declared partition, in order.
    pub fn commit_partitions(
        &mut self,
        provider: &dyn BlockProvider,
        supported: &BTreeSet<FilesystemType>,
    ) -> Result<()> {
        if !self.table_written {
            return Err(ProvisionError::State(format!(
                "disk {}: commit_partitions before write_table",
                self.device.display()
            )));
        }
        if self.partitioned && !self.stale {
            tracing::debug!(device = %self.device.display(), "partitions already committed");
            return Ok(());
        }

        ensure_not_mounted(provider, self.guard_paths())?;

        // Fail on an uncreatable filesystem before any partition exists.
        for part in &self.partitions {
            if !supported.contains(&part.fstype) {
                return Err(ValidationError::UnsupportedFilesystem(
                    part.fstype.as_str().to_string(),
                )
                .into());
            }
        }

        let geometry = provider.device_geometry(&self.device)?;
        let mut cursor = self.table.first_usable_sector();

        for part in &mut self.partitions {
            let range = resolve_range(&part.start, &part.stop, cursor, &geometry)?;

            tracing::info!(
                device = %self.device.display(),
                partition = part.number,
                id = %part.id,
                start = range.start,
                end = range.end,
                role = part.role.as_str(),
                "creating partition"
            );

            provider.add_partition(
                &self.device,
                self.table,
                &PartitionSpec {
                    number: part.number,
                    role: part.role,
                    range,
                    fstype: part.fstype,
                    name: part.name.clone(),
                },
            )?;

            for flag in &part.flags {
                match provider.flag_name(*flag) {
                    Some(_) => provider.set_flag(&self.device, part.number, *flag)?,
                    None => tracing::warn!(
                        partition = part.number,
                        flag = flag.as_str(),
                        backend = provider.name(),
                        "flag has no backend equivalent, dropping"
                    ),
                }
            }

            part.resolved = Some(range);
            cursor = range.end + 1;
        }

        self.partitioned = true;
        self.stale = false;
        Ok(())
    }
}

impl BlockDevice for Disk {
    fn path(&self) -> &Path {
        &self.device
    }

    fn is_ready(&self) -> bool {
        self.table_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use provision_types::DiskGeometry;

    fn disk_config(table: &str, count: usize) -> DiskConfig {
        let partitions: Vec<String> = (1..=count)
            .map(|i| {
                let stop = if i == count { "-0" } else { "1G" };
                format!(
                    r#"[[partitions]]
                    id = "p{i}"
                    start = "0"
                    stop = "{stop}"
                    fstype = "ext4"
                    "#
                )
            })
            .collect();
        let doc = format!(
            "device = \"/dev/sda\"\ntable = \"{table}\"\n{}",
            partitions.join("\n")
        );
        toml::from_str(&doc).expect("valid disk config")
    }

    #[test]
    fn five_mbr_partitions_get_extended_and_logical_roles() {
        let disk = Disk::from_config(&disk_config("msdos", 5)).expect("disk");
        let roles: Vec<PartitionRole> = disk.partitions().iter().map(Partition::role).collect();
        assert_eq!(
            roles,
            vec![
                PartitionRole::Primary,
                PartitionRole::Primary,
                PartitionRole::Primary,
                PartitionRole::Extended,
                PartitionRole::Logical,
            ]
        );
    }

    #[test]
    fn four_mbr_partitions_are_all_primary() {
        let disk = Disk::from_config(&disk_config("msdos", 4)).expect("disk");
        assert!(disk
            .partitions()
            .iter()
            .all(|part| part.role() == PartitionRole::Primary));
    }

    #[test]
    fn gpt_partition_count_is_capped() {
        let err = Disk::from_config(&disk_config("gpt", 129)).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Validation(ValidationError::TooManyPartitions { .. })
        ));
    }

    #[test]
    fn write_table_refuses_mounted_device() {
        let provider = MockProvider::new();
        provider.add_mount("/dev/sda1", "/mnt/data");

        let mut disk = Disk::from_config(&disk_config("gpt", 2)).expect("disk");
        let err = disk.write_table(&provider).unwrap_err();
        assert!(matches!(err, ProvisionError::Safety { .. }));
        // The guard must fire before anything destructive happens.
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn commit_requires_written_table() {
        let provider = MockProvider::new();
        let mut disk = Disk::from_config(&disk_config("gpt", 1)).expect("disk");
        let err = disk
            .commit_partitions(&provider, &provider.supported_filesystems())
            .unwrap_err();
        assert!(matches!(err, ProvisionError::State(_)));
    }

    #[test]
    fn cursor_anchored_partitions_chain() {
        let provider = MockProvider::with_geometry(DiskGeometry {
            total_sectors: 41_943_040,
            sector_size: 512,
        });

        let mut disk = Disk::from_config(&disk_config("msdos", 3)).expect("disk");
        disk.write_table(&provider).expect("table");
        disk.commit_partitions(&provider, &provider.supported_filesystems())
            .expect("commit");

        let ranges: Vec<SectorRange> = disk
            .partitions()
            .iter()
            .map(|part| part.resolved().expect("resolved"))
            .collect();

        assert_eq!(ranges[0].start, 2048);
        assert_eq!(ranges[1].start, ranges[0].end + 1);
        assert_eq!(ranges[2].start, ranges[1].end + 1);
        assert_eq!(ranges[2].end, 41_943_040 - 1);
    }

    #[test]
    fn unsupported_fstype_fails_before_any_partition_is_created() {
        let provider = MockProvider::new();
        let mut disk = Disk::from_config(&disk_config("gpt", 2)).expect("disk");
        disk.write_table(&provider).expect("table");

        let before = provider.calls().len();
        let err = disk
            .commit_partitions(&provider, &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Validation(ValidationError::UnsupportedFilesystem(_))
        ));
        assert_eq!(provider.calls().len(), before);
    }
}

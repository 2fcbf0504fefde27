// SPDX-License-Identifier: GPL-3.0-only

//! Recording provider double for unit tests. Logs every destructive call
//! and answers probes from in-memory state, so lifecycle and guard logic
//! can be exercised without touching real devices.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use provision_sys::luks::{KeySource, LuksInfo};
use provision_sys::mdraid::{CreateArray, SuperblockInfo};
use provision_sys::mounts::MountEntry;
use provision_sys::{BlockProvider, PartitionEntry, PartitionSpec, Result};
use provision_types::{DiskGeometry, FilesystemType, PartitionFlag, TableKind};

pub struct MockProvider {
    calls: RefCell<Vec<String>>,
    mounts: RefCell<Vec<MountEntry>>,
    tables: RefCell<BTreeMap<PathBuf, TableKind>>,
    superblocks: RefCell<BTreeMap<PathBuf, SuperblockInfo>>,
    luks_headers: RefCell<BTreeSet<PathBuf>>,
    geometry: DiskGeometry,
    pub luks_info: LuksInfo,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_geometry(DiskGeometry {
            total_sectors: 41_943_040,
            sector_size: 512,
        })
    }

    pub fn with_geometry(geometry: DiskGeometry) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            mounts: RefCell::new(Vec::new()),
            tables: RefCell::new(BTreeMap::new()),
            superblocks: RefCell::new(BTreeMap::new()),
            luks_headers: RefCell::new(BTreeSet::new()),
            geometry,
            luks_info: LuksInfo {
                version: Some("2".to_string()),
                cipher: Some("aes-xts-plain64".to_string()),
                uuid: Some("11111111-2222-3333-4444-555555555555".to_string()),
                label: None,
                key_slots: vec![0],
            },
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    pub fn add_mount(&self, source: &str, mount_point: &str) {
        self.mounts.borrow_mut().push(MountEntry {
            source: PathBuf::from(source),
            mount_point: PathBuf::from(mount_point),
            fs_type: "ext4".to_string(),
        });
    }

    pub fn add_superblock(&self, member: &str, info: SuperblockInfo) {
        self.superblocks
            .borrow_mut()
            .insert(PathBuf::from(member), info);
    }
}

fn key_desc(key: &KeySource<'_>) -> String {
    match key {
        KeySource::Stdin(_) => "stdin".to_string(),
        KeySource::File(path) => path.display().to_string(),
    }
}

impl BlockProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn device_geometry(&self, _device: &Path) -> Result<DiskGeometry> {
        Ok(self.geometry)
    }

    fn probe_table(&self, device: &Path) -> Result<Option<TableKind>> {
        Ok(self.tables.borrow().get(device).copied())
    }

    fn write_table(&self, device: &Path, kind: TableKind) -> Result<()> {
        self.log(format!("write_table {} {kind}", device.display()));
        self.tables.borrow_mut().insert(device.to_path_buf(), kind);
        Ok(())
    }

    fn add_partition(&self, device: &Path, _kind: TableKind, spec: &PartitionSpec) -> Result<()> {
        self.log(format!(
            "add_partition {} {} {} {}..{}",
            device.display(),
            spec.number,
            spec.role.as_str(),
            spec.range.start,
            spec.range.end
        ));
        Ok(())
    }

    fn flag_name(&self, flag: PartitionFlag) -> Option<&'static str> {
        // Same full vocabulary as the parted backend, except `hidden`, so
        // tests can observe a dropped flag.
        match flag {
            PartitionFlag::Hidden => None,
            other => Some(other.as_str()),
        }
    }

    fn set_flag(&self, device: &Path, number: u32, flag: PartitionFlag) -> Result<()> {
        self.log(format!(
            "set_flag {} {number} {}",
            device.display(),
            flag.as_str()
        ));
        Ok(())
    }

    fn list_partitions(&self, _device: &Path) -> Result<Vec<PartitionEntry>> {
        Ok(Vec::new())
    }

    fn is_luks(&self, device: &Path) -> Result<bool> {
        Ok(self.luks_headers.borrow().contains(device))
    }

    fn luks_format(&self, device: &Path, key: KeySource<'_>) -> Result<()> {
        self.log(format!("luks_format {} {}", device.display(), key_desc(&key)));
        self.luks_headers.borrow_mut().insert(device.to_path_buf());
        Ok(())
    }

    fn luks_add_key(&self, device: &Path, auth: KeySource<'_>, new: KeySource<'_>) -> Result<()> {
        self.log(format!(
            "luks_add_key {} auth={} new={}",
            device.display(),
            key_desc(&auth),
            key_desc(&new)
        ));
        Ok(())
    }

    fn luks_open(&self, device: &Path, name: &str, key: KeySource<'_>) -> Result<()> {
        self.log(format!(
            "luks_open {} {name} {}",
            device.display(),
            key_desc(&key)
        ));
        Ok(())
    }

    fn luks_close(&self, name: &str) -> Result<()> {
        self.log(format!("luks_close {name}"));
        Ok(())
    }

    fn luks_dump(&self, _device: &Path) -> Result<LuksInfo> {
        Ok(self.luks_info.clone())
    }

    fn raid_create(&self, array: &CreateArray<'_>) -> Result<()> {
        self.log(format!(
            "raid_create {} level={} members={}",
            array.device.display(),
            array.level,
            array.members.len()
        ));
        for member in array.members {
            self.superblocks.borrow_mut().insert(
                member.clone(),
                SuperblockInfo {
                    array_uuid: Some("aaaa:bbbb:cccc:dddd".to_string()),
                    name: array.name.map(str::to_string),
                    level: Some(format!("raid{}", array.level)),
                    version: Some(array.metadata.to_string()),
                    raid_devices: Some(array.members.len() as u32),
                },
            );
        }
        Ok(())
    }

    fn raid_assemble(&self, device: &Path, members: &[PathBuf]) -> Result<()> {
        self.log(format!(
            "raid_assemble {} members={}",
            device.display(),
            members.len()
        ));
        Ok(())
    }

    fn raid_assemble_scan(&self, device: &Path) -> Result<()> {
        self.log(format!("raid_assemble_scan {}", device.display()));
        Ok(())
    }

    fn raid_stop(&self, device: &Path) -> Result<()> {
        self.log(format!("raid_stop {}", device.display()));
        Ok(())
    }

    fn zero_superblock(&self, member: &Path) -> Result<()> {
        self.log(format!("zero_superblock {}", member.display()));
        self.superblocks.borrow_mut().remove(member);
        Ok(())
    }

    fn examine(&self, member: &Path) -> Result<Option<SuperblockInfo>> {
        Ok(self.superblocks.borrow().get(member).cloned())
    }

    fn pv_create(&self, device: &Path) -> Result<()> {
        self.log(format!("pv_create {}", device.display()));
        Ok(())
    }

    fn vg_create(&self, name: &str, pvs: &[PathBuf]) -> Result<()> {
        self.log(format!("vg_create {name} pvs={}", pvs.len()));
        Ok(())
    }

    fn lv_create(
        &self,
        vg: &str,
        name: &str,
        size: Option<&str>,
        extents: Option<&str>,
    ) -> Result<()> {
        self.log(format!(
            "lv_create {vg}/{name} size={} extents={}",
            size.unwrap_or("-"),
            extents.unwrap_or("-")
        ));
        Ok(())
    }

    fn supported_filesystems(&self) -> BTreeSet<FilesystemType> {
        [
            FilesystemType::Ext2,
            FilesystemType::Ext3,
            FilesystemType::Ext4,
            FilesystemType::Xfs,
            FilesystemType::Btrfs,
            FilesystemType::Vfat,
            FilesystemType::Swap,
        ]
        .into_iter()
        .collect()
    }

    fn make_filesystem(
        &self,
        device: &Path,
        fstype: FilesystemType,
        options: &[String],
    ) -> Result<()> {
        self.log(format!(
            "make_filesystem {} {} [{}]",
            device.display(),
            fstype.as_str(),
            options.join(" ")
        ));
        Ok(())
    }

    fn live_mounts(&self) -> Result<Vec<MountEntry>> {
        Ok(self.mounts.borrow().clone())
    }

    fn mount(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: Option<&str>,
    ) -> Result<()> {
        self.log(format!(
            "mount {} {} fstype={} options={}",
            device.display(),
            target.display(),
            fstype.unwrap_or("-"),
            options.unwrap_or("-")
        ));
        self.mounts.borrow_mut().push(MountEntry {
            source: device.to_path_buf(),
            mount_point: target.to_path_buf(),
            fs_type: fstype.unwrap_or("ext4").to_string(),
        });
        Ok(())
    }

    fn unmount(&self, target: &Path, lazy: bool, force: bool) -> Result<()> {
        self.log(format!("unmount {} lazy={lazy} force={force}", target.display()));
        self.mounts
            .borrow_mut()
            .retain(|entry| entry.mount_point != target);
        Ok(())
    }
}

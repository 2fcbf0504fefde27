// SPDX-License-Identifier: GPL-3.0-only

//! Block device provider abstraction
//!
//! One trait, two interchangeable backends: parted's machine interface and
//! the util-linux sfdisk toolchain. The backend is probed once at startup;
//! everything above receives a `Box<dyn BlockProvider>` and never learns
//! which one it got.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use provision_types::{DiskGeometry, FilesystemType, PartitionFlag, PartitionRole, SectorRange, TableKind};

use crate::luks::{KeySource, LuksInfo};
use crate::mdraid::{CreateArray, SuperblockInfo};
use crate::mounts::MountEntry;
use crate::parted::PartedBackend;
use crate::sfdisk::SfdiskBackend;
use crate::{luks, lvm, mdraid, mkfs, mounts, Result, SysError};

/// A partition the engine wants created.
#[derive(Debug, Clone)]
pub struct PartitionSpec {
    /// 1-based position on the disk.
    pub number: u32,
    pub role: PartitionRole,
    pub range: SectorRange,
    pub fstype: FilesystemType,
    pub name: Option<String>,
}

/// A partition as reported back by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub number: u32,
    pub start: u64,
    pub end: u64,
    pub type_code: String,
}

/// The full operation contract the engine programs against.
///
/// Partitioning differs per backend; encryption, RAID, LVM, filesystem
/// and mount operations are the same standalone tools either way and come
/// with default implementations, so both backends expose one identical
/// surface and stay substitutable in tests.
pub trait BlockProvider {
    fn name(&self) -> &'static str;

    fn device_geometry(&self, device: &Path) -> Result<DiskGeometry>;

    /// Table kind currently on the device, if any. Used to make
    /// table-write idempotent against reality rather than in-memory flags.
    fn probe_table(&self, device: &Path) -> Result<Option<TableKind>>;

    fn write_table(&self, device: &Path, kind: TableKind) -> Result<()>;

    /// Create one partition. Alignment is the backend's responsibility
    /// (optimal alignment where the tool supports it).
    fn add_partition(&self, device: &Path, kind: TableKind, spec: &PartitionSpec) -> Result<()>;

    /// Translate a canonical flag into this backend's vocabulary.
    /// `None` means the backend cannot express the flag; callers drop it.
    fn flag_name(&self, flag: PartitionFlag) -> Option<&'static str>;

    /// Enable a flag on a partition. Only called for flags this backend
    /// reported a name for.
    fn set_flag(&self, device: &Path, number: u32, flag: PartitionFlag) -> Result<()>;

    fn list_partitions(&self, device: &Path) -> Result<Vec<PartitionEntry>>;

    // Encryption

    fn is_luks(&self, device: &Path) -> Result<bool> {
        luks::is_luks(device)
    }

    fn luks_format(&self, device: &Path, key: KeySource<'_>) -> Result<()> {
        luks::luks_format(device, key)
    }

    fn luks_add_key(&self, device: &Path, auth: KeySource<'_>, new: KeySource<'_>) -> Result<()> {
        luks::luks_add_key(device, auth, new)
    }

    fn luks_open(&self, device: &Path, name: &str, key: KeySource<'_>) -> Result<()> {
        luks::luks_open(device, name, key)
    }

    fn luks_close(&self, name: &str) -> Result<()> {
        luks::luks_close(name)
    }

    fn luks_dump(&self, device: &Path) -> Result<LuksInfo> {
        luks::luks_dump(device)
    }

    // RAID

    fn raid_create(&self, array: &CreateArray<'_>) -> Result<()> {
        mdraid::raid_create(array)
    }

    fn raid_assemble(&self, device: &Path, members: &[PathBuf]) -> Result<()> {
        mdraid::raid_assemble(device, members)
    }

    fn raid_assemble_scan(&self, device: &Path) -> Result<()> {
        mdraid::raid_assemble_scan(device)
    }

    fn raid_stop(&self, device: &Path) -> Result<()> {
        mdraid::raid_stop(device)
    }

    fn zero_superblock(&self, member: &Path) -> Result<()> {
        mdraid::zero_superblock(member)
    }

    fn examine(&self, member: &Path) -> Result<Option<SuperblockInfo>> {
        mdraid::examine(member)
    }

    // LVM

    fn pv_create(&self, device: &Path) -> Result<()> {
        lvm::pv_create(device)
    }

    fn vg_create(&self, name: &str, pvs: &[PathBuf]) -> Result<()> {
        lvm::vg_create(name, pvs)
    }

    fn lv_create(
        &self,
        vg: &str,
        name: &str,
        size: Option<&str>,
        extents: Option<&str>,
    ) -> Result<()> {
        lvm::lv_create(vg, name, size, extents)
    }

    // Filesystems and mounts

    fn supported_filesystems(&self) -> BTreeSet<FilesystemType> {
        mkfs::supported_filesystems()
    }

    fn make_filesystem(
        &self,
        device: &Path,
        fstype: FilesystemType,
        options: &[String],
    ) -> Result<()> {
        mkfs::make_filesystem(device, fstype, options)
    }

    fn live_mounts(&self) -> Result<Vec<MountEntry>> {
        mounts::live_mounts()
    }

    fn mount(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: Option<&str>,
    ) -> Result<()> {
        mounts::mount(device, target, fstype, options)
    }

    fn unmount(&self, target: &Path, lazy: bool, force: bool) -> Result<()> {
        mounts::unmount(target, lazy, force)
    }
}

/// Probe which partitioning backend is available. Runs once at startup;
/// parted is preferred when both are installed.
pub fn detect_backend() -> Result<Box<dyn BlockProvider>> {
    if which::which("parted").is_ok() {
        tracing::info!("using parted backend");
        return Ok(Box::new(PartedBackend::new()));
    }
    if which::which("sfdisk").is_ok() {
        tracing::info!("using sfdisk backend");
        return Ok(Box::new(SfdiskBackend::new()));
    }
    Err(SysError::ToolMissing(
        "neither parted nor sfdisk found".to_string(),
    ))
}

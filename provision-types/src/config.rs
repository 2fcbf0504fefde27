// SPDX-License-Identifier: GPL-3.0-only

//! Declarative storage topology
//!
//! The configuration-parsing collaborator hands the engine this tree,
//! already schema-validated and default-populated. Devices reference each
//! other by id: a RAID member or LUKS target may name a disk device path,
//! a `disk-id:partition-id` pair, a RAID array id, a LUKS volume name or a
//! `vg/lv` pair.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::filesystem::FilesystemType;
use crate::raid::{RaidMetadata, DEFAULT_CHUNK_KIB};
use crate::size::SizeSpec;
use crate::table::{PartitionFlag, TableKind};

/// Root of the declared topology.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub disks: Vec<DiskConfig>,

    #[serde(default)]
    pub raid_arrays: Vec<RaidConfig>,

    #[serde(default)]
    pub luks_volumes: Vec<LuksConfig>,

    #[serde(default)]
    pub volume_groups: Vec<VolumeGroupConfig>,

    #[serde(default)]
    pub filesystems: Vec<FilesystemConfig>,

    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

/// One physical disk and its declared partitions.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    /// Device node, e.g. `/dev/sda` or `/dev/nvme0n1`.
    pub device: PathBuf,

    /// Table kind; `bios`/`mbr`/`dos` normalize to msdos.
    pub table: TableKind,

    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionConfig {
    pub id: String,
    pub start: SizeSpec,
    pub stop: SizeSpec,
    pub fstype: FilesystemType,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub flags: Vec<PartitionFlag>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RaidConfig {
    pub id: String,
    pub level: crate::raid::RaidLevel,

    #[serde(default = "default_metadata")]
    pub metadata: RaidMetadata,

    /// Chunk size in KiB.
    #[serde(default = "default_chunk")]
    pub chunk: u32,

    #[serde(default)]
    pub layout: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Ordered member device references.
    pub members: Vec<String>,
}

fn default_metadata() -> RaidMetadata {
    RaidMetadata::V1_2
}

fn default_chunk() -> u32 {
    DEFAULT_CHUNK_KIB
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LuksConfig {
    /// Mapper name; the unlocked volume appears at `/dev/mapper/<name>`.
    pub name: String,

    /// Reference to the device carrying the LUKS header.
    pub device: String,

    /// At least one secret; the first is the primary key slot.
    pub secrets: Vec<SecretConfig>,
}

/// One credential for a LUKS key slot: a passphrase, a key file, or a key
/// file whose own bytes are passphrase-protected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretConfig {
    #[serde(default)]
    pub passphrase: Option<String>,

    #[serde(default)]
    pub keyfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeGroupConfig {
    pub name: String,

    /// Device references that become physical volumes.
    pub pvs: Vec<String>,

    #[serde(default)]
    pub lvs: Vec<LvConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LvConfig {
    pub name: String,

    /// Size understood by `lvcreate -L` (e.g. `8G`), or `100%FREE`-style
    /// extents via `-l` when `extents` is set instead.
    #[serde(default)]
    pub size: Option<String>,

    #[serde(default)]
    pub extents: Option<String>,
}

/// A filesystem declared on top of some block device reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemConfig {
    pub device: String,
    pub fstype: FilesystemType,

    /// Ordered `name` or `name=value` mkfs options.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Unique ascending application order; parents must sort before
    /// nested mount targets.
    pub order: u32,

    /// Reference to the formatted device.
    pub source: String,

    pub target: PathBuf,

    #[serde(default)]
    pub fstype: Option<FilesystemType>,

    /// Mount options; an empty value marks a bare flag (`noatime`), a
    /// non-empty one a `key=value` pair.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

// SPDX-License-Identifier: GPL-3.0-only

//! Block device capability
//!
//! Disk, Partition, EncryptedVolume, RaidArray and LogicalVolume all
//! expose a stable device path and a readiness flag through one trait, so
//! any layer can wrap any other without runtime type checks. Each device
//! is owned by at most one wrapper; ownership moves enforce that.

use std::fs;
use std::path::{Path, PathBuf};

use provision_sys::BlockProvider;

use crate::error::{ProvisionError, Result};

pub trait BlockDevice {
    /// Stable device node path (e.g. `/dev/sda1`, `/dev/mapper/cryptroot`).
    fn path(&self) -> &Path;

    /// Whether the device currently exists and can be layered upon.
    fn is_ready(&self) -> bool;
}

/// A device that already exists on the system, referenced by path alone.
/// Used when a layer wraps something provisioned in an earlier stage.
#[derive(Debug, Clone)]
pub struct ExistingDevice {
    path: PathBuf,
}

impl ExistingDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BlockDevice for ExistingDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// Device node of partition `number` on `disk`. NVMe and MMC device names
/// end in a digit and take a `p` infix before the partition number.
pub fn partition_device_path(disk: &Path, number: u32) -> PathBuf {
    let disk_str = disk.display().to_string();
    let name = disk
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();

    if name.contains("nvme") || name.contains("mmcblk") {
        PathBuf::from(format!("{disk_str}p{number}"))
    } else {
        PathBuf::from(format!("{disk_str}{number}"))
    }
}

fn canonical_or_same(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Destructive-operation guard: fail with [`ProvisionError::Safety`] when
/// any of the given device paths is currently a mount source. Matching is
/// exact on canonical paths; callers enumerate partition children
/// themselves.
pub fn ensure_not_mounted<'a>(
    provider: &dyn BlockProvider,
    devices: impl IntoIterator<Item = &'a Path>,
) -> Result<()> {
    let mounts = provider.live_mounts()?;

    for device in devices {
        let canonical = canonical_or_same(device);
        if let Some(entry) = mounts
            .iter()
            .find(|entry| canonical_or_same(&entry.source) == canonical)
        {
            return Err(ProvisionError::Safety {
                device: device.to_path_buf(),
                mount_point: entry.mount_point.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_paths_use_p_infix_for_digit_terminated_names() {
        assert_eq!(
            partition_device_path(Path::new("/dev/sda"), 2),
            PathBuf::from("/dev/sda2")
        );
        assert_eq!(
            partition_device_path(Path::new("/dev/nvme0n1"), 3),
            PathBuf::from("/dev/nvme0n1p3")
        );
        assert_eq!(
            partition_device_path(Path::new("/dev/mmcblk0"), 1),
            PathBuf::from("/dev/mmcblk0p1")
        );
    }
}

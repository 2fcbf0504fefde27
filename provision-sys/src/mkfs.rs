// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem creation and capability probing

use std::collections::BTreeSet;
use std::path::Path;

use provision_types::FilesystemType;

use crate::cmd::run_capture;
use crate::{Result, SysError};

const ALL_TYPES: &[FilesystemType] = &[
    FilesystemType::Ext2,
    FilesystemType::Ext3,
    FilesystemType::Ext4,
    FilesystemType::Xfs,
    FilesystemType::Btrfs,
    FilesystemType::Vfat,
    FilesystemType::Swap,
];

/// Filesystem types whose creation tool is present on this host. Probed
/// once at startup by the orchestrator and consulted before any partition
/// is created.
pub fn supported_filesystems() -> BTreeSet<FilesystemType> {
    ALL_TYPES
        .iter()
        .copied()
        .filter(|fstype| which::which(fstype.mkfs_command()).is_ok())
        .collect()
}

/// Create a filesystem. `options` are passed through verbatim, in order,
/// ahead of the device argument.
pub fn make_filesystem(device: &Path, fstype: FilesystemType, options: &[String]) -> Result<()> {
    let command = fstype.mkfs_command();
    if which::which(command).is_err() {
        return Err(SysError::ToolMissing(command.to_string()));
    }

    let device = device.display().to_string();
    let mut args: Vec<&str> = options.iter().map(String::as_str).collect();
    args.push(&device);

    run_capture(command, &args)?;
    Ok(())
}

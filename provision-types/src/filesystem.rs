// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem type catalog

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Filesystem types the engine knows how to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FilesystemType {
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Btrfs,
    Vfat,
    Swap,
}

impl FilesystemType {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.to_ascii_lowercase().as_str() {
            "ext2" => Ok(Self::Ext2),
            "ext3" => Ok(Self::Ext3),
            "ext4" => Ok(Self::Ext4),
            "xfs" => Ok(Self::Xfs),
            "btrfs" => Ok(Self::Btrfs),
            "vfat" | "fat32" => Ok(Self::Vfat),
            "swap" | "linux-swap" => Ok(Self::Swap),
            other => Err(ValidationError::UnsupportedFilesystem(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Vfat => "vfat",
            Self::Swap => "swap",
        }
    }

    /// Command that creates this filesystem.
    pub fn mkfs_command(&self) -> &'static str {
        match self {
            Self::Ext2 => "mkfs.ext2",
            Self::Ext3 => "mkfs.ext3",
            Self::Ext4 => "mkfs.ext4",
            Self::Xfs => "mkfs.xfs",
            Self::Btrfs => "mkfs.btrfs",
            Self::Vfat => "mkfs.vfat",
            Self::Swap => "mkswap",
        }
    }

    /// Partition type code understood by parted's `mkpart` fs-type field.
    pub fn parted_code(&self) -> &'static str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Vfat => "fat32",
            Self::Swap => "linux-swap",
        }
    }
}

impl<'de> Deserialize<'de> for FilesystemType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(FilesystemType::parse("fat32").expect("fat32"), FilesystemType::Vfat);
        assert_eq!(
            FilesystemType::parse("linux-swap").expect("swap"),
            FilesystemType::Swap
        );
        assert!(FilesystemType::parse("zfs").is_err());
    }

    #[test]
    fn mkfs_commands() {
        assert_eq!(FilesystemType::Ext4.mkfs_command(), "mkfs.ext4");
        assert_eq!(FilesystemType::Swap.mkfs_command(), "mkswap");
    }
}

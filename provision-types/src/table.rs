// SPDX-License-Identifier: GPL-3.0-only

//! Partition table vocabulary: table kinds, slot roles and canonical flags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Partition table type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableKind {
    /// GPT (GUID Partition Table)
    Gpt,

    /// MBR/DOS (Master Boot Record)
    Msdos,
}

impl TableKind {
    /// Parse a configured table kind; `bios`, `mbr` and `dos` are accepted
    /// aliases for `msdos`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.to_ascii_lowercase().as_str() {
            "gpt" => Ok(Self::Gpt),
            "msdos" | "bios" | "mbr" | "dos" => Ok(Self::Msdos),
            other => Err(ValidationError::UnknownTableKind(other.to_string())),
        }
    }

    /// String form used by both provider backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt => "gpt",
            Self::Msdos => "msdos",
        }
    }

    /// First sector a partition may occupy before provider alignment.
    pub fn first_usable_sector(&self) -> u64 {
        match self {
            Self::Gpt => 0,
            Self::Msdos => 2048,
        }
    }

    /// Maximum number of directly addressable slots. MBR disks may carry
    /// further logical partitions behind one extended slot.
    pub fn max_slots(&self) -> usize {
        match self {
            Self::Gpt => 128,
            Self::Msdos => 4,
        }
    }
}

impl<'de> Deserialize<'de> for TableKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot role of an MBR partition. GPT partitions are always primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionRole {
    Primary,
    Extended,
    Logical,
}

impl PartitionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Extended => "extended",
            Self::Logical => "logical",
        }
    }
}

/// Canonical partition flags declared in configuration.
///
/// Each provider backend translates these through its own vocabulary; a
/// flag the backend cannot express is dropped with a warning, not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PartitionFlag {
    Boot,
    Esp,
    BiosGrub,
    Swap,
    Raid,
    Lvm,
    Hidden,
    LegacyBoot,
}

impl FromStr for PartitionFlag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boot" => Ok(Self::Boot),
            "esp" => Ok(Self::Esp),
            "bios_grub" => Ok(Self::BiosGrub),
            "swap" => Ok(Self::Swap),
            "raid" => Ok(Self::Raid),
            "lvm" => Ok(Self::Lvm),
            "hidden" => Ok(Self::Hidden),
            "legacy_boot" => Ok(Self::LegacyBoot),
            other => Err(ValidationError::UnknownPartitionFlag(other.to_string())),
        }
    }
}

impl PartitionFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::Esp => "esp",
            Self::BiosGrub => "bios_grub",
            Self::Swap => "swap",
            Self::Raid => "raid",
            Self::Lvm => "lvm",
            Self::Hidden => "hidden",
            Self::LegacyBoot => "legacy_boot",
        }
    }
}

impl<'de> Deserialize<'de> for PartitionFlag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

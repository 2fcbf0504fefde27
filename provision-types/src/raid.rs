// SPDX-License-Identifier: GPL-3.0-only

//! RAID array vocabulary and invariant checks
//!
//! Levels, metadata versions, chunk sizes and layouts are validated here,
//! before mdadm ever sees them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default chunk size in KiB for striped levels.
pub const DEFAULT_CHUNK_KIB: u32 = 512;

/// Supported software RAID levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RaidLevel {
    Raid0,
    Raid1,
    Raid4,
    Raid5,
    Raid6,
    Raid10,
}

impl RaidLevel {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim_start_matches("raid") {
            "0" => Ok(Self::Raid0),
            "1" => Ok(Self::Raid1),
            "4" => Ok(Self::Raid4),
            "5" => Ok(Self::Raid5),
            "6" => Ok(Self::Raid6),
            "10" => Ok(Self::Raid10),
            _ => Err(ValidationError::UnsupportedRaidLevel(s.to_string())),
        }
    }

    /// Numeric form passed to `mdadm --level`.
    pub fn as_number(&self) -> u32 {
        match self {
            Self::Raid0 => 0,
            Self::Raid1 => 1,
            Self::Raid4 => 4,
            Self::Raid5 => 5,
            Self::Raid6 => 6,
            Self::Raid10 => 10,
        }
    }

    fn chunk_must_be_power_of_two(&self) -> bool {
        matches!(self, Self::Raid4 | Self::Raid5 | Self::Raid6 | Self::Raid10)
    }

    fn chunk_must_be_divisible_by_four(&self) -> bool {
        matches!(
            self,
            Self::Raid0 | Self::Raid4 | Self::Raid5 | Self::Raid6 | Self::Raid10
        )
    }

    /// Validate a chunk size (KiB) against this level's constraints.
    pub fn validate_chunk(&self, chunk: u32) -> Result<(), ValidationError> {
        if self.chunk_must_be_power_of_two() && !chunk.is_power_of_two() {
            return Err(ValidationError::InvalidChunkSize {
                chunk,
                level: self.to_string(),
                reason: "must be a power of two".to_string(),
            });
        }
        if self.chunk_must_be_divisible_by_four() && chunk % 4 != 0 {
            return Err(ValidationError::InvalidChunkSize {
                chunk,
                level: self.to_string(),
                reason: "must be divisible by 4".to_string(),
            });
        }
        Ok(())
    }

    /// Default layout for the level, or `None` when the level has no
    /// layout concept.
    pub fn default_layout(&self) -> Option<&'static str> {
        match self {
            Self::Raid5 | Self::Raid6 => Some("left-symmetric"),
            Self::Raid10 => Some("n2"),
            _ => None,
        }
    }

    /// Validate a configured layout string; falls back to the level
    /// default when absent.
    pub fn resolve_layout(
        &self,
        configured: Option<&str>,
    ) -> Result<Option<String>, ValidationError> {
        let Some(layout) = configured else {
            return Ok(self.default_layout().map(str::to_string));
        };

        let valid = match self {
            Self::Raid5 | Self::Raid6 => matches!(
                layout,
                "left-asymmetric" | "right-asymmetric" | "left-symmetric" | "right-symmetric"
            ),
            Self::Raid10 => {
                let mut chars = layout.chars();
                matches!(chars.next(), Some('n' | 'o' | 'f'))
                    && chars.as_str().parse::<u32>().is_ok()
            }
            _ => false,
        };

        if !valid {
            return Err(ValidationError::InvalidRaidLayout {
                layout: layout.to_string(),
                level: self.to_string(),
            });
        }
        Ok(Some(layout.to_string()))
    }
}

impl fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raid{}", self.as_number())
    }
}

impl<'de> Deserialize<'de> for RaidLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Superblock metadata version accepted by mdadm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RaidMetadata {
    V0_90,
    V1_0,
    V1_1,
    V1_2,
}

impl RaidMetadata {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "0.90" | "0.9" => Ok(Self::V0_90),
            "1.0" => Ok(Self::V1_0),
            "1.1" => Ok(Self::V1_1),
            "1.2" | "default" => Ok(Self::V1_2),
            other => Err(ValidationError::UnsupportedRaidMetadata(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V0_90 => "0.90",
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
        }
    }
}

impl<'de> Deserialize<'de> for RaidMetadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Configuration-level validation failures.
///
/// Raised while the declarative tree is turned into typed objects, before
/// anything touches a device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown partition table kind: {0}")]
    UnknownTableKind(String),

    #[error("unsupported RAID level: {0}")]
    UnsupportedRaidLevel(String),

    #[error("unsupported RAID metadata version: {0}")]
    UnsupportedRaidMetadata(String),

    #[error("invalid chunk size {chunk} for RAID level {level}: {reason}")]
    InvalidChunkSize {
        chunk: u32,
        level: String,
        reason: String,
    },

    #[error("invalid layout {layout:?} for RAID level {level}")]
    InvalidRaidLayout { layout: String, level: String },

    #[error("invalid size expression {input:?}: {reason}")]
    InvalidSizeSpec { input: String, reason: String },

    #[error("unsupported filesystem type: {0}")]
    UnsupportedFilesystem(String),

    #[error("unknown partition flag: {0}")]
    UnknownPartitionFlag(String),

    #[error("partition count {count} exceeds {table} table limit of {max}")]
    TooManyPartitions {
        count: usize,
        table: String,
        max: usize,
    },
}

/// A resolved sector range is inverted or falls outside the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("sector range inverted: start {start} > end {end}")]
    Inverted { start: u64, end: u64 },

    #[error("sector {sector} out of device bounds (total {total} sectors)")]
    OutOfBounds { sector: u64, total: u64 },

    #[error("percentage magnitude must be non-zero")]
    ZeroPercent,
}

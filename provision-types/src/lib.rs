// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the storage provisioning engine
//!
//! This crate defines the shared types used throughout the stack:
//!
//! - **provision-sys**: consumes table/flag/filesystem vocabulary when
//!   invoking external tooling
//! - **provision-engine**: builds its Disk/RAID/LUKS/filesystem objects
//!   from the declarative config tree defined here
//!
//! Everything in this crate is pure: no I/O, no subprocesses. The geometry
//! resolver in particular is a deterministic function from a size grammar
//! to absolute sector positions.

pub mod config;
pub mod error;
pub mod filesystem;
pub mod geometry;
pub mod raid;
pub mod size;
pub mod table;

pub use config::{
    DiskConfig, FilesystemConfig, LuksConfig, LvConfig, MountConfig, PartitionConfig, RaidConfig,
    SecretConfig, StorageConfig, VolumeGroupConfig,
};
pub use error::{GeometryError, ValidationError};
pub use filesystem::FilesystemType;
pub use geometry::{resolve_range, DiskGeometry, SectorRange};
pub use raid::{RaidLevel, RaidMetadata, DEFAULT_CHUNK_KIB};
pub use size::{SizeAnchor, SizeSpec, SizeUnit};
pub use table::{PartitionFlag, PartitionRole, TableKind};

// SPDX-License-Identifier: GPL-3.0-only

//! Declarative storage provisioning engine.
//!
//! A [`StorageConfig`](provision_types::StorageConfig) plan is applied by
//! the [`Orchestrator`] through a [`BlockProvider`](provision_sys::BlockProvider)
//! in a fixed stage order: partition tables, partitions, RAID, LUKS, LVM,
//! filesystems, mounts. Destructive operations refuse to touch mounted
//! devices and completed stages are skipped on re-runs.

pub mod device;
pub mod disk;
pub mod error;
pub mod fs;
pub mod luks;
pub mod lvm;
pub mod orchestrate;
pub mod raid;
pub mod registry;

#[cfg(test)]
mod mock;

pub use device::{BlockDevice, ExistingDevice};
pub use disk::{Disk, Partition};
pub use error::{ProvisionError, Result};
pub use fs::{Filesystem, MountPoint};
pub use luks::{EncryptedVolume, Secret};
pub use lvm::{LogicalVolume, PhysicalVolume, VolumeGroup};
pub use orchestrate::Orchestrator;
pub use raid::{ArrayState, RaidArray, RaidMember};
pub use registry::{CryptRegistry, RaidRegistry};

// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for storage provisioning
//!
//! This crate is the only place that invokes external tooling:
//! - partitioning through one of two interchangeable backends
//!   (parted's machine interface, or sfdisk as a fallback)
//! - cryptsetup, mdadm and the LVM tools
//! - mkfs and mount/umount
//! - the live mount table in `/proc/self/mountinfo`
//!
//! All calls are synchronous and blocking. These operations are
//! destructive and should only be driven by the provisioning engine.

pub mod cmd;
pub mod error;
pub mod luks;
pub mod lvm;
pub mod mdraid;
pub mod mkfs;
pub mod mounts;
pub mod parted;
pub mod provider;
pub mod sfdisk;

pub use error::{Result, SysError};
pub use provider::{detect_backend, BlockProvider, PartitionEntry, PartitionSpec};

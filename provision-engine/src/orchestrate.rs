// SPDX-License-Identifier: GPL-3.0-only

//! Plan application
//!
//! The orchestrator walks a [`StorageConfig`] through the fixed stage
//! order: partition tables, partitions, RAID arrays, encrypted volumes,
//! LVM, filesystems, mounts. Later stages reference earlier outputs by
//! symbolic name; references are resolved against a table built as each
//! stage completes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use provision_sys::BlockProvider;
use provision_types::{MountConfig, SecretConfig, StorageConfig};

use crate::device::{BlockDevice, ExistingDevice};
use crate::disk::Disk;
use crate::error::{ProvisionError, Result};
use crate::fs::{Filesystem, MountPoint};
use crate::luks::{EncryptedVolume, Secret};
use crate::lvm::{PhysicalVolume, VolumeGroup};
use crate::raid::RaidArray;
use crate::registry::{CryptRegistry, RaidRegistry};

pub const DEFAULT_CRYPT_REGISTRY: &str = "/etc/crypttab";
pub const DEFAULT_RAID_REGISTRY: &str = "/etc/mdadm.conf";

pub struct Orchestrator<'a> {
    provider: &'a dyn BlockProvider,
    crypt_registry: CryptRegistry,
    raid_registry: RaidRegistry,
}

/// Symbolic names for devices provisioned by earlier stages. Absolute
/// paths bypass the table.
#[derive(Debug, Default)]
struct References {
    table: BTreeMap<String, PathBuf>,
}

impl References {
    fn register(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let name = name.into();
        let path = path.into();
        tracing::debug!(name, path = %path.display(), "registering device reference");
        self.table.insert(name, path);
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        if reference.starts_with('/') {
            return Ok(PathBuf::from(reference));
        }
        self.table
            .get(reference)
            .cloned()
            .ok_or_else(|| ProvisionError::UnknownReference(reference.to_string()))
    }
}

fn build_secret(config: &SecretConfig) -> Result<Secret> {
    match (&config.passphrase, &config.keyfile) {
        (_, Some(keyfile)) => {
            if config.passphrase.is_some() {
                tracing::warn!(
                    keyfile = %keyfile.display(),
                    "secret declares both a passphrase and a key file, using the key file"
                );
            }
            Ok(Secret::keyfile(keyfile))
        }
        (Some(passphrase), None) => Ok(Secret::passphrase(passphrase.as_bytes())),
        (None, None) => Err(ProvisionError::State(
            "secret declares neither a passphrase nor a key file".to_string(),
        )),
    }
}

impl<'a> Orchestrator<'a> {
    pub fn new(provider: &'a dyn BlockProvider) -> Self {
        Self::with_registries(provider, DEFAULT_CRYPT_REGISTRY, DEFAULT_RAID_REGISTRY)
    }

    pub fn with_registries(
        provider: &'a dyn BlockProvider,
        crypt_path: impl Into<PathBuf>,
        raid_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            crypt_registry: CryptRegistry::new(crypt_path),
            raid_registry: RaidRegistry::new(raid_path),
        }
    }

    /// Apply the whole plan. Any error aborts the run where it stands;
    /// already-applied stages are left in place and a re-run picks up
    /// behind them through the per-stage idempotence probes.
    pub fn apply(&mut self, config: &StorageConfig) -> Result<()> {
        let mut refs = References::default();
        let supported = self.provider.supported_filesystems();

        for disk_config in &config.disks {
            let mut disk = Disk::from_config(disk_config)?;
            disk.write_table(self.provider)?;

            let stem = disk_stem(disk.device());
            for partition in disk.partitions() {
                refs.register(format!("{stem}:{}", partition.id()), partition.path());
            }

            disk.commit_partitions(self.provider, &supported)?;
        }

        for raid_config in &config.raid_arrays {
            let mut array = RaidArray::from_config(raid_config)?;
            for member in &raid_config.members {
                let path = refs.resolve(member)?;
                array.add_member(Box::new(ExistingDevice::new(path)));
            }
            array.create(self.provider, &mut self.raid_registry)?;
            refs.register(array.id(), array.path());
        }

        for luks_config in &config.luks_volumes {
            let lower = refs.resolve(&luks_config.device)?;
            let mut volume =
                EncryptedVolume::new(&luks_config.name, Box::new(ExistingDevice::new(lower)));
            for secret in &luks_config.secrets {
                volume.add_secret(self.provider, build_secret(secret)?)?;
            }

            volume.create(self.provider)?;
            volume.unlock(self.provider)?;
            volume.update_info(self.provider)?;
            volume.write_conf(&mut self.crypt_registry)?;

            refs.register(volume.name(), volume.path());
        }

        for vg_config in &config.volume_groups {
            let pvs = vg_config
                .pvs
                .iter()
                .map(|pv| {
                    let path = refs.resolve(pv)?;
                    Ok(PhysicalVolume::new(Box::new(ExistingDevice::new(path))))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut vg = VolumeGroup::from_config(vg_config, pvs);
            vg.create(self.provider)?;
            vg.create_volumes(self.provider)?;

            for lv in vg.logical_volumes() {
                refs.register(format!("{}/{}", vg.name(), lv.name()), lv.path());
            }
        }

        for fs_config in &config.filesystems {
            let device = refs.resolve(&fs_config.device)?;
            let mut filesystem =
                Filesystem::new(fs_config, Box::new(ExistingDevice::new(device)));
            filesystem.format(self.provider, &supported)?;
        }

        let mut by_order: BTreeMap<u32, &MountConfig> = BTreeMap::new();
        for mount_config in &config.mounts {
            if by_order.insert(mount_config.order, mount_config).is_some() {
                return Err(ProvisionError::State(format!(
                    "duplicate mount order {}",
                    mount_config.order
                )));
            }
        }
        for mount_config in by_order.into_values() {
            let source = refs.resolve(&mount_config.source)?;
            let mount = MountPoint::new(mount_config, Box::new(ExistingDevice::new(source)));
            mount.mount(self.provider)?;
        }

        Ok(())
    }
}

fn disk_stem(device: &Path) -> String {
    device
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| device.display().to_string())
}

// SPDX-License-Identifier: GPL-3.0-only

//! LVM lifecycle
//!
//! Physical volumes are initialized under the mount guard, grouped into a
//! volume group, then carved into logical volumes. Logical volumes are
//! block devices for the filesystem and mount stages.

use std::path::{Path, PathBuf};

use provision_sys::lvm::lv_path;
use provision_sys::BlockProvider;
use provision_types::{LvConfig, VolumeGroupConfig};

use crate::device::{ensure_not_mounted, BlockDevice};
use crate::error::{ProvisionError, Result};

pub struct PhysicalVolume {
    device: Box<dyn BlockDevice>,
    created: bool,
}

impl PhysicalVolume {
    pub fn new(device: Box<dyn BlockDevice>) -> Self {
        Self {
            device,
            created: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.device.path()
    }

    pub fn create(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.created {
            return Ok(());
        }
        ensure_not_mounted(provider, [self.device.path()])?;
        tracing::info!(device = %self.device.path().display(), "initializing physical volume");
        provider.pv_create(self.device.path())?;
        self.created = true;
        Ok(())
    }
}

pub struct VolumeGroup {
    name: String,
    pvs: Vec<PhysicalVolume>,
    lvs: Vec<LogicalVolume>,
    created: bool,
}

impl VolumeGroup {
    pub fn from_config(config: &VolumeGroupConfig, pvs: Vec<PhysicalVolume>) -> Self {
        let lvs = config
            .lvs
            .iter()
            .map(|lv| LogicalVolume::from_config(&config.name, lv))
            .collect();
        Self {
            name: config.name.clone(),
            pvs,
            lvs,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logical_volumes(&self) -> &[LogicalVolume] {
        &self.lvs
    }

    /// Initialize every backing physical volume, then create the group.
    pub fn create(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.pvs.is_empty() {
            return Err(ProvisionError::State(format!(
                "volume group {}: create without physical volumes",
                self.name
            )));
        }
        if self.created {
            tracing::debug!(vg = %self.name, "volume group already created");
            return Ok(());
        }

        for pv in &mut self.pvs {
            pv.create(provider)?;
        }

        let pv_paths: Vec<PathBuf> = self.pvs.iter().map(|pv| pv.path().to_path_buf()).collect();
        tracing::info!(vg = %self.name, pvs = pv_paths.len(), "creating volume group");
        provider.vg_create(&self.name, &pv_paths)?;
        self.created = true;
        Ok(())
    }

    /// Create the declared logical volumes, in declaration order so
    /// `100%FREE`-style extents consume what earlier volumes left.
    pub fn create_volumes(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if !self.created {
            return Err(ProvisionError::State(format!(
                "volume group {}: create_volumes before create",
                self.name
            )));
        }
        for lv in &mut self.lvs {
            lv.create(provider)?;
        }
        Ok(())
    }
}

pub struct LogicalVolume {
    vg: String,
    name: String,
    size: Option<String>,
    extents: Option<String>,
    path: PathBuf,
    created: bool,
}

impl LogicalVolume {
    fn from_config(vg: &str, config: &LvConfig) -> Self {
        Self {
            vg: vg.to_string(),
            name: config.name.clone(),
            size: config.size.clone(),
            extents: config.extents.clone(),
            path: lv_path(vg, &config.name),
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn create(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.created {
            return Ok(());
        }
        tracing::info!(vg = %self.vg, lv = %self.name, "creating logical volume");
        provider.lv_create(
            &self.vg,
            &self.name,
            self.size.as_deref(),
            self.extents.as_deref(),
        )?;
        self.created = true;
        Ok(())
    }
}

impl BlockDevice for LogicalVolume {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_ready(&self) -> bool {
        self.created
    }
}

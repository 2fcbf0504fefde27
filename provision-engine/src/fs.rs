// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem creation and mounting
//!
//! Formatting is destructive and runs under the mount guard; mounting
//! consults the live mount table so a target that is already mounted is
//! left alone rather than shadowed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use provision_sys::BlockProvider;
use provision_types::{FilesystemConfig, FilesystemType, MountConfig, ValidationError};

use crate::device::{ensure_not_mounted, BlockDevice};
use crate::error::Result;

pub struct Filesystem {
    device: Box<dyn BlockDevice>,
    fstype: FilesystemType,
    options: Vec<String>,
    formatted: bool,
}

impl Filesystem {
    pub fn new(config: &FilesystemConfig, device: Box<dyn BlockDevice>) -> Self {
        Self {
            device,
            fstype: config.fstype,
            options: config.options.clone(),
            formatted: false,
        }
    }

    pub fn device_path(&self) -> &Path {
        self.device.path()
    }

    pub fn fstype(&self) -> FilesystemType {
        self.fstype
    }

    /// Create the filesystem. Options are passed to the mkfs tool
    /// verbatim, in declared order, ahead of the device argument.
    pub fn format(
        &mut self,
        provider: &dyn BlockProvider,
        supported: &BTreeSet<FilesystemType>,
    ) -> Result<()> {
        if self.formatted {
            tracing::debug!(device = %self.device.path().display(), "filesystem already created");
            return Ok(());
        }
        if !supported.contains(&self.fstype) {
            return Err(
                ValidationError::UnsupportedFilesystem(self.fstype.as_str().to_string()).into(),
            );
        }

        ensure_not_mounted(provider, [self.device.path()])?;

        tracing::info!(
            device = %self.device.path().display(),
            fstype = self.fstype.as_str(),
            "creating filesystem"
        );
        provider.make_filesystem(self.device.path(), self.fstype, &self.options)?;
        self.formatted = true;
        Ok(())
    }
}

pub struct MountPoint {
    order: u32,
    source: Box<dyn BlockDevice>,
    target: PathBuf,
    fstype: Option<FilesystemType>,
    options: BTreeMap<String, String>,
}

impl MountPoint {
    pub fn new(config: &MountConfig, source: Box<dyn BlockDevice>) -> Self {
        Self {
            order: config.order,
            source,
            target: config.target.clone(),
            fstype: config.fstype,
            options: config.options.clone(),
        }
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Comma-joined option string: a bare key for flag options, `k=v`
    /// otherwise. `None` when no options were declared.
    fn options_string(&self) -> Option<String> {
        if self.options.is_empty() {
            return None;
        }
        let joined = self
            .options
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    key.clone()
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        Some(joined)
    }

    fn is_mounted(&self, provider: &dyn BlockProvider) -> Result<bool> {
        Ok(provider
            .live_mounts()?
            .iter()
            .any(|entry| entry.mount_point == self.target))
    }

    /// Mount the source at the target, creating the target directory
    /// first. A no-op when something is already mounted there.
    pub fn mount(&self, provider: &dyn BlockProvider) -> Result<()> {
        if self.is_mounted(provider)? {
            tracing::debug!(target = %self.target.display(), "target already mounted");
            return Ok(());
        }

        fs::create_dir_all(&self.target)?;

        tracing::info!(
            source = %self.source.path().display(),
            target = %self.target.display(),
            "mounting"
        );
        provider.mount(
            self.source.path(),
            &self.target,
            self.fstype.as_ref().map(FilesystemType::as_str),
            self.options_string().as_deref(),
        )?;
        Ok(())
    }

    /// Unmount the target. Mounted-ness is re-derived from the live mount
    /// table, so unmounting an already-unmounted target is a no-op. A
    /// forced unmount always reaches the tool: a hung mount may be absent
    /// from the table yet still hold the target.
    pub fn unmount(&self, provider: &dyn BlockProvider, lazy: bool, force: bool) -> Result<()> {
        if !self.is_mounted(provider)? && !force {
            tracing::debug!(target = %self.target.display(), "target not mounted");
            return Ok(());
        }
        provider.unmount(&self.target, lazy, force)?;
        Ok(())
    }
}

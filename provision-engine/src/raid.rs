// SPDX-License-Identifier: GPL-3.0-only

//! Software RAID lifecycle
//!
//! Members are prepared individually (stale superblocks wiped under the
//! mount guard), then the array is created or re-assembled and recorded
//! in the mdadm registry.

use std::fs;
use std::path::{Path, PathBuf};

use provision_sys::mdraid::CreateArray;
use provision_sys::BlockProvider;
use provision_types::{RaidConfig, RaidLevel, RaidMetadata};

use crate::device::{ensure_not_mounted, BlockDevice};
use crate::error::{ProvisionError, Result};
use crate::registry::RaidRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayState {
    Unconfigured,
    Created,
    Assembled,
    Disassembled,
}

/// One member device of an array.
pub struct RaidMember {
    device: Box<dyn BlockDevice>,
    prepared: bool,
}

impl RaidMember {
    pub fn new(device: Box<dyn BlockDevice>) -> Self {
        Self {
            device,
            prepared: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.device.path()
    }

    /// Wipe any stale superblock so the member joins the new array
    /// cleanly. Guarded against the member being mounted, and verified by
    /// a second examine afterwards.
    pub fn prepare(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.prepared {
            return Ok(());
        }

        if let Some(old) = provider.examine(self.device.path())? {
            ensure_not_mounted(provider, [self.device.path()])?;
            tracing::info!(
                member = %self.device.path().display(),
                array_uuid = old.array_uuid.as_deref().unwrap_or("unknown"),
                "wiping stale superblock"
            );
            provider.zero_superblock(self.device.path())?;

            if provider.examine(self.device.path())?.is_some() {
                return Err(ProvisionError::State(format!(
                    "member {}: superblock survived zeroing",
                    self.device.path().display()
                )));
            }
        }

        self.prepared = true;
        Ok(())
    }
}

pub struct RaidArray {
    id: String,
    device: PathBuf,
    level: RaidLevel,
    metadata: RaidMetadata,
    chunk: u32,
    layout: Option<String>,
    name: Option<String>,
    members: Vec<RaidMember>,
    state: ArrayState,
}

fn read_hostname() -> String {
    fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

impl RaidArray {
    /// Validate level, chunk and layout up front; members are attached
    /// afterwards via [`RaidArray::add_member`].
    pub fn from_config(config: &RaidConfig) -> Result<Self> {
        let level = config.level;
        level.validate_chunk(config.chunk)?;
        let layout = level.resolve_layout(config.layout.as_deref())?;

        Ok(Self {
            id: config.id.clone(),
            device: PathBuf::from(format!("/dev/{}", config.id)),
            level,
            metadata: config.metadata,
            chunk: config.chunk,
            layout,
            name: config.name.clone(),
            members: Vec::new(),
            state: ArrayState::Unconfigured,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ArrayState {
        self.state
    }

    pub fn add_member(&mut self, device: Box<dyn BlockDevice>) {
        self.members.push(RaidMember::new(device));
    }

    /// Prepare every member, build the array and record it in the
    /// registry. The declared member order is the mdadm argument order.
    pub fn create(
        &mut self,
        provider: &dyn BlockProvider,
        registry: &mut RaidRegistry,
    ) -> Result<()> {
        if self.members.is_empty() {
            return Err(ProvisionError::State(format!(
                "array {}: create without members",
                self.id
            )));
        }
        if self.state == ArrayState::Created || self.state == ArrayState::Assembled {
            tracing::debug!(array = %self.id, "array already created");
            return Ok(());
        }

        for member in &mut self.members {
            member.prepare(provider)?;
        }

        let member_paths: Vec<PathBuf> = self
            .members
            .iter()
            .map(|member| member.path().to_path_buf())
            .collect();
        let homehost = read_hostname();

        tracing::info!(
            array = %self.id,
            level = self.level.as_number(),
            members = member_paths.len(),
            "creating RAID array"
        );
        provider.raid_create(&CreateArray {
            device: &self.device,
            level: self.level.as_number(),
            metadata: self.metadata.as_str(),
            chunk: (self.level != RaidLevel::Raid1).then_some(self.chunk),
            layout: self.layout.as_deref(),
            name: self.name.as_deref(),
            homehost: Some(&homehost),
            members: &member_paths,
        })?;

        // Every member must now carry the new superblock.
        for member in &self.members {
            if provider.examine(member.path())?.is_none() {
                return Err(ProvisionError::State(format!(
                    "array {}: member {} has no superblock after creation",
                    self.id,
                    member.path().display()
                )));
            }
        }
        self.state = ArrayState::Created;

        self.write_conf(provider, registry)
    }

    /// Record the array's descriptor line, derived from the first
    /// member's fresh superblock.
    pub fn write_conf(
        &self,
        provider: &dyn BlockProvider,
        registry: &mut RaidRegistry,
    ) -> Result<()> {
        let first = self.members.first().ok_or_else(|| {
            ProvisionError::State(format!("array {}: write_conf without members", self.id))
        })?;
        let info = provider.examine(first.path())?.ok_or_else(|| {
            ProvisionError::State(format!(
                "array {}: no superblock on {} after creation",
                self.id,
                first.path().display()
            ))
        })?;

        let mut line = format!(
            "ARRAY {} metadata={}",
            self.device.display(),
            self.metadata.as_str()
        );
        if let Some(name) = info.name.as_deref() {
            line.push_str(&format!(" name={name}"));
        }
        if let Some(uuid) = info.array_uuid.as_deref() {
            line.push_str(&format!(" UUID={uuid}"));
        }

        registry.append(&self.device.display().to_string(), &line)
    }

    /// Assemble the array from its members, or by scanning when the
    /// members are not attached to this object.
    pub fn start(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.state == ArrayState::Assembled {
            tracing::debug!(array = %self.id, "array already assembled");
            return Ok(());
        }

        if self.members.is_empty() {
            provider.raid_assemble_scan(&self.device)?;
        } else {
            let member_paths: Vec<PathBuf> = self
                .members
                .iter()
                .map(|member| member.path().to_path_buf())
                .collect();
            provider.raid_assemble(&self.device, &member_paths)?;
        }

        self.state = ArrayState::Assembled;
        Ok(())
    }

    pub fn stop(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.state != ArrayState::Created && self.state != ArrayState::Assembled {
            tracing::debug!(array = %self.id, "array not running");
            return Ok(());
        }
        provider.raid_stop(&self.device)?;
        self.state = ArrayState::Disassembled;
        Ok(())
    }
}

impl BlockDevice for RaidArray {
    fn path(&self) -> &Path {
        &self.device
    }

    fn is_ready(&self) -> bool {
        self.state == ArrayState::Created || self.state == ArrayState::Assembled
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Encrypted volume lifecycle
//!
//! An [`EncryptedVolume`] wraps a lower block device and drives the
//! provider through format, unlock, lock and header inspection. Secrets
//! are held as either an in-memory passphrase (zeroized on drop) or a key
//! file path; missing key files are generated with random content before
//! first use.

use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore;
use zeroize::Zeroizing;

use provision_sys::luks::{mapper_path, KeySource, LuksInfo};
use provision_sys::BlockProvider;

use crate::device::{ensure_not_mounted, BlockDevice};
use crate::error::{ProvisionError, Result};
use crate::registry::CryptRegistry;

/// Size of generated key files.
pub const KEYFILE_BYTES: usize = 4096;

/// One key-slot credential.
pub enum Secret {
    Passphrase(Zeroizing<Vec<u8>>),
    Keyfile(PathBuf),
}

impl Secret {
    pub fn passphrase(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Passphrase(Zeroizing::new(bytes.into()))
    }

    pub fn keyfile(path: impl Into<PathBuf>) -> Self {
        Self::Keyfile(path.into())
    }

    pub fn keyfile_path(&self) -> Option<&Path> {
        match self {
            Self::Keyfile(path) => Some(path),
            Self::Passphrase(_) => None,
        }
    }

    fn key_source(&self) -> KeySource<'_> {
        match self {
            Self::Passphrase(bytes) => KeySource::Stdin(bytes.as_slice()),
            Self::Keyfile(path) => KeySource::File(path),
        }
    }

    /// Create the key file with random content when it does not exist
    /// yet. Owner-only permissions; an existing file is left untouched.
    fn materialize(&self) -> Result<()> {
        let Self::Keyfile(path) = self else {
            return Ok(());
        };
        if path.exists() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut bytes = Zeroizing::new(vec![0u8; KEYFILE_BYTES]);
        rand::thread_rng().fill_bytes(&mut bytes);
        fs::write(path, &*bytes)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %path.display(), "generated key file");
        Ok(())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passphrase(_) => f.write_str("Secret::Passphrase(..)"),
            Self::Keyfile(path) => write!(f, "Secret::Keyfile({})", path.display()),
        }
    }
}

pub struct EncryptedVolume {
    name: String,
    mapper: PathBuf,
    device: Box<dyn BlockDevice>,
    secrets: Vec<Secret>,
    created: bool,
    locked: bool,
    info: Option<LuksInfo>,
}

impl EncryptedVolume {
    pub fn new(name: impl Into<String>, device: Box<dyn BlockDevice>) -> Self {
        let name = name.into();
        let mapper = mapper_path(&name);
        Self {
            name,
            mapper,
            device,
            secrets: Vec::new(),
            created: false,
            locked: true,
            info: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a secret. On a volume that already carries a header the
    /// secret is enrolled into a key slot immediately, authenticated by
    /// the primary; otherwise enrollment happens at [`Self::create`].
    pub fn add_secret(&mut self, provider: &dyn BlockProvider, secret: Secret) -> Result<()> {
        if self.created {
            let primary = self.secrets.first().ok_or_else(|| {
                ProvisionError::State(format!("volume {}: no primary secret", self.name))
            })?;
            secret.materialize()?;
            provider.luks_add_key(self.device.path(), primary.key_source(), secret.key_source())?;
        }
        self.secrets.push(secret);
        Ok(())
    }

    /// Format the lower device as LUKS, enrolling the first secret as the
    /// primary key slot and every further secret as an additional slot
    /// authenticated by the primary.
    ///
    /// An existing LUKS header on the device is taken as this volume
    /// having been created by a previous run and is left intact.
    pub fn create(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.secrets.is_empty() {
            return Err(ProvisionError::State(format!(
                "volume {}: create without any secrets",
                self.name
            )));
        }

        ensure_not_mounted(provider, [self.device.path()])?;

        if provider.is_luks(self.device.path())? {
            tracing::info!(
                device = %self.device.path().display(),
                name = %self.name,
                "existing LUKS header, not formatting"
            );
            // The primary slot belongs to the earlier run; the remaining
            // declared secrets still need their slots.
            for secret in &self.secrets {
                secret.materialize()?;
            }
            let primary = &self.secrets[0];
            for extra in &self.secrets[1..] {
                provider.luks_add_key(
                    self.device.path(),
                    primary.key_source(),
                    extra.key_source(),
                )?;
            }
            self.created = true;
            return Ok(());
        }

        for secret in &self.secrets {
            secret.materialize()?;
        }

        tracing::info!(
            device = %self.device.path().display(),
            name = %self.name,
            "formatting LUKS volume"
        );
        let primary = &self.secrets[0];
        provider.luks_format(self.device.path(), primary.key_source())?;

        for extra in &self.secrets[1..] {
            provider.luks_add_key(self.device.path(), primary.key_source(), extra.key_source())?;
        }

        self.created = true;
        self.locked = true;
        Ok(())
    }

    /// Open the volume at `/dev/mapper/<name>` using the primary secret.
    /// A no-op when already unlocked, including by a previous run.
    pub fn unlock(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if !self.created {
            return Err(ProvisionError::State(format!(
                "volume {}: unlock before create",
                self.name
            )));
        }
        if !self.locked || self.mapper.exists() {
            tracing::debug!(name = %self.name, "volume already unlocked");
            self.locked = false;
            return Ok(());
        }

        let primary = self
            .secrets
            .first()
            .ok_or_else(|| ProvisionError::State(format!("volume {}: no secrets", self.name)))?;
        provider.luks_open(self.device.path(), &self.name, primary.key_source())?;
        self.locked = false;
        Ok(())
    }

    /// Close the mapping. A no-op when already locked.
    pub fn lock(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if !self.created {
            return Err(ProvisionError::State(format!(
                "volume {}: lock before create",
                self.name
            )));
        }
        if self.locked {
            tracing::debug!(name = %self.name, "volume already locked");
            return Ok(());
        }

        provider.luks_close(&self.name)?;
        self.locked = true;
        self.info = None;
        Ok(())
    }

    /// Refresh header metadata from the device. Only valid while the
    /// volume is unlocked, matching when the header is authoritative.
    pub fn update_info(&mut self, provider: &dyn BlockProvider) -> Result<()> {
        if self.locked {
            return Err(ProvisionError::State(format!(
                "volume {}: update_info while locked",
                self.name
            )));
        }
        self.info = Some(provider.luks_dump(self.device.path())?);
        Ok(())
    }

    pub fn info(&self) -> Option<&LuksInfo> {
        self.info.as_ref()
    }

    /// Record this volume in the crypt registry. The identifier is the
    /// header UUID when known, otherwise the raw device path; the third
    /// field is the first key file among the secrets, or `-`.
    pub fn write_conf(&self, registry: &mut CryptRegistry) -> Result<()> {
        if self.secrets.is_empty() {
            return Err(ProvisionError::State(format!(
                "volume {}: write_conf without any secrets",
                self.name
            )));
        }

        let identifier = match self.info.as_ref().and_then(|info| info.uuid.as_deref()) {
            Some(uuid) => format!("UUID={uuid}"),
            None => self.device.path().display().to_string(),
        };
        let keyfile = self
            .secrets
            .iter()
            .find_map(Secret::keyfile_path)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());

        registry.append(&format!("{} {identifier} {keyfile} luks", self.name))
    }
}

impl BlockDevice for EncryptedVolume {
    fn path(&self) -> &Path {
        &self.mapper
    }

    fn is_ready(&self) -> bool {
        self.created && !self.locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ExistingDevice;
    use crate::mock::MockProvider;

    fn volume() -> EncryptedVolume {
        EncryptedVolume::new("cryptdata", Box::new(ExistingDevice::new("/dev/sdb1")))
    }

    #[test]
    fn create_without_secrets_is_a_state_error() {
        let provider = MockProvider::new();
        let mut vol = volume();
        let err = vol.create(&provider).unwrap_err();
        assert!(matches!(err, ProvisionError::State(_)));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn create_formats_then_enrolls_extra_slots() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keyfile = dir.path().join("keys/data.key");

        let provider = MockProvider::new();
        let mut vol = volume();
        vol.add_secret(&provider, Secret::keyfile(&keyfile))
            .expect("keyfile secret");
        vol.add_secret(&provider, Secret::passphrase("hunter2"))
            .expect("passphrase secret");
        vol.create(&provider).expect("create");

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("luks_format /dev/sdb1"));
        assert!(calls[1].starts_with("luks_add_key /dev/sdb1"));
        assert!(calls[1].ends_with("new=stdin"));

        // Missing key file was generated with fixed size and 0600 mode.
        let meta = fs::metadata(&keyfile).expect("keyfile metadata");
        assert_eq!(meta.len() as usize, KEYFILE_BYTES);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn create_skips_format_when_header_already_present() {
        let provider = MockProvider::new();
        let mut first = volume();
        first
            .add_secret(&provider, Secret::passphrase("hunter2"))
            .expect("secret");
        first.create(&provider).expect("first create");

        let mut second = volume();
        second
            .add_secret(&provider, Secret::passphrase("hunter2"))
            .expect("secret");
        second.create(&provider).expect("second create");

        let formats = provider
            .calls()
            .iter()
            .filter(|call| call.starts_with("luks_format"))
            .count();
        assert_eq!(formats, 1);
    }

    #[test]
    fn extra_secrets_enroll_against_an_existing_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keyfile = dir.path().join("data.key");

        let provider = MockProvider::new();
        let mut first = volume();
        first
            .add_secret(&provider, Secret::keyfile(&keyfile))
            .expect("primary");
        first.create(&provider).expect("first create");

        // Same device, one more declared secret: the format is skipped but
        // the new slot still lands.
        let mut second = volume();
        second
            .add_secret(&provider, Secret::keyfile(&keyfile))
            .expect("primary");
        second
            .add_secret(&provider, Secret::passphrase("backup"))
            .expect("extra");
        second.create(&provider).expect("second create");

        let calls = provider.calls();
        let formats = calls
            .iter()
            .filter(|call| call.starts_with("luks_format"))
            .count();
        assert_eq!(formats, 1);
        let last = calls.last().expect("calls");
        assert!(last.starts_with("luks_add_key /dev/sdb1"));
        assert!(last.ends_with("new=stdin"));
    }

    #[test]
    fn secret_added_after_create_is_enrolled_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keyfile = dir.path().join("data.key");

        let provider = MockProvider::new();
        let mut vol = volume();
        vol.add_secret(&provider, Secret::keyfile(&keyfile))
            .expect("primary");
        vol.create(&provider).expect("create");

        vol.add_secret(&provider, Secret::passphrase("backup"))
            .expect("post-create secret");

        let calls = provider.calls();
        let last = calls.last().expect("calls");
        assert!(last.starts_with("luks_add_key /dev/sdb1"));
        assert!(last.ends_with("new=stdin"));
    }

    #[test]
    fn unlock_and_lock_are_noops_in_their_target_state() {
        let provider = MockProvider::new();
        let mut vol = volume();
        vol.add_secret(&provider, Secret::passphrase("hunter2"))
            .expect("secret");
        vol.create(&provider).expect("create");

        vol.unlock(&provider).expect("unlock");
        vol.unlock(&provider).expect("second unlock");
        vol.lock(&provider).expect("lock");
        vol.lock(&provider).expect("second lock");

        let opens = provider
            .calls()
            .iter()
            .filter(|call| call.starts_with("luks_open"))
            .count();
        let closes = provider
            .calls()
            .iter()
            .filter(|call| call.starts_with("luks_close"))
            .count();
        assert_eq!(opens, 1);
        assert_eq!(closes, 1);
    }

    #[test]
    fn unlock_before_create_is_a_state_error() {
        let provider = MockProvider::new();
        let mut vol = volume();
        vol.add_secret(&provider, Secret::passphrase("hunter2"))
            .expect("secret");
        assert!(matches!(
            vol.unlock(&provider).unwrap_err(),
            ProvisionError::State(_)
        ));
    }

    #[test]
    fn update_info_requires_unlocked_volume() {
        let provider = MockProvider::new();
        let mut vol = volume();
        vol.add_secret(&provider, Secret::passphrase("hunter2"))
            .expect("secret");
        vol.create(&provider).expect("create");

        assert!(matches!(
            vol.update_info(&provider).unwrap_err(),
            ProvisionError::State(_)
        ));

        vol.unlock(&provider).expect("unlock");
        vol.update_info(&provider).expect("update_info");
        assert_eq!(
            vol.info().and_then(|info| info.uuid.as_deref()),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }

    #[test]
    fn write_conf_uses_uuid_and_keyfile_when_available() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keyfile = dir.path().join("data.key");
        let mut registry = CryptRegistry::new(dir.path().join("crypttab"));

        let provider = MockProvider::new();
        let mut vol = volume();
        vol.add_secret(&provider, Secret::keyfile(&keyfile))
            .expect("secret");
        vol.create(&provider).expect("create");
        vol.unlock(&provider).expect("unlock");
        vol.update_info(&provider).expect("update_info");
        vol.write_conf(&mut registry).expect("write_conf");

        let contents = fs::read_to_string(registry.path()).expect("read");
        assert_eq!(
            contents.trim_end(),
            format!(
                "cryptdata UUID=11111111-2222-3333-4444-555555555555 {} luks",
                keyfile.display()
            )
        );
    }

    #[test]
    fn write_conf_falls_back_to_device_path_and_dash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut registry = CryptRegistry::new(dir.path().join("crypttab"));

        let provider = MockProvider::new();
        let mut vol = volume();
        vol.add_secret(&provider, Secret::passphrase("hunter2"))
            .expect("secret");
        vol.create(&provider).expect("create");
        vol.write_conf(&mut registry).expect("write_conf");

        let contents = fs::read_to_string(registry.path()).expect("read");
        assert_eq!(contents.trim_end(), "cryptdata /dev/sdb1 - luks");
    }
}

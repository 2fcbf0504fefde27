// SPDX-License-Identifier: GPL-3.0-only

//! cryptsetup operations
//!
//! Key material is never placed on the command line: passphrases go to
//! cryptsetup over stdin (`--key-file -`), key files by path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cmd::{run_capture, run_query, run_with_stdin};
use crate::Result;

/// Where cryptsetup should read a key from.
#[derive(Debug, Clone, Copy)]
pub enum KeySource<'a> {
    Stdin(&'a [u8]),
    File(&'a Path),
}

/// Header metadata reported by `cryptsetup luksDump`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LuksInfo {
    pub version: Option<String>,
    pub cipher: Option<String>,
    pub uuid: Option<String>,
    pub label: Option<String>,
    pub key_slots: Vec<u32>,
}

fn device_arg(device: &Path) -> String {
    device.display().to_string()
}

pub fn mapper_path(name: &str) -> PathBuf {
    PathBuf::from("/dev/mapper").join(name)
}

/// True when the device carries a LUKS header.
pub fn is_luks(device: &Path) -> Result<bool> {
    Ok(run_query("cryptsetup", &["isLuks", &device_arg(device)])?.is_some())
}

pub fn luks_format(device: &Path, key: KeySource<'_>) -> Result<()> {
    let device = device_arg(device);
    match key {
        KeySource::Stdin(passphrase) => {
            run_with_stdin(
                "cryptsetup",
                &["--batch-mode", "--key-file", "-", "luksFormat", &device],
                passphrase,
            )?;
        }
        KeySource::File(path) => {
            run_capture(
                "cryptsetup",
                &[
                    "--batch-mode",
                    "--key-file",
                    &path.display().to_string(),
                    "luksFormat",
                    &device,
                ],
            )?;
        }
    }
    Ok(())
}

/// Add `new` to a free key slot, authenticating with `auth`.
pub fn luks_add_key(device: &Path, auth: KeySource<'_>, new: KeySource<'_>) -> Result<()> {
    let device = device_arg(device);
    match (auth, new) {
        (KeySource::File(auth_path), KeySource::File(new_path)) => {
            run_capture(
                "cryptsetup",
                &[
                    "--batch-mode",
                    "--key-file",
                    &auth_path.display().to_string(),
                    "luksAddKey",
                    &device,
                    &new_path.display().to_string(),
                ],
            )?;
        }
        (KeySource::Stdin(auth_bytes), KeySource::File(new_path)) => {
            run_with_stdin(
                "cryptsetup",
                &[
                    "--batch-mode",
                    "--key-file",
                    "-",
                    "luksAddKey",
                    &device,
                    &new_path.display().to_string(),
                ],
                auth_bytes,
            )?;
        }
        (auth, KeySource::Stdin(new_bytes)) => {
            // cryptsetup reads the new passphrase from stdin when no key
            // file argument is given; the authenticating key must then be
            // a file so the two do not compete for the same stream.
            let auth_file = match auth {
                KeySource::File(path) => path.display().to_string(),
                KeySource::Stdin(_) => {
                    return Err(crate::SysError::OperationFailed(
                        "adding a passphrase slot requires a key-file primary".to_string(),
                    ))
                }
            };
            run_with_stdin(
                "cryptsetup",
                &[
                    "--batch-mode",
                    "--key-file",
                    &auth_file,
                    "luksAddKey",
                    &device,
                ],
                new_bytes,
            )?;
        }
    }
    Ok(())
}

pub fn luks_open(device: &Path, name: &str, key: KeySource<'_>) -> Result<()> {
    let device = device_arg(device);
    match key {
        KeySource::Stdin(passphrase) => {
            run_with_stdin(
                "cryptsetup",
                &["--key-file", "-", "open", &device, name],
                passphrase,
            )?;
        }
        KeySource::File(path) => {
            run_capture(
                "cryptsetup",
                &[
                    "--key-file",
                    &path.display().to_string(),
                    "open",
                    &device,
                    name,
                ],
            )?;
        }
    }
    Ok(())
}

pub fn luks_close(name: &str) -> Result<()> {
    run_capture("cryptsetup", &["close", name])?;
    Ok(())
}

pub fn luks_dump(device: &Path) -> Result<LuksInfo> {
    let output = run_capture("cryptsetup", &["luksDump", &device_arg(device)])?;
    Ok(parse_luks_dump(&output))
}

fn parse_luks_dump(output: &str) -> LuksInfo {
    let mut info = LuksInfo::default();
    let mut fields = BTreeMap::new();
    let mut in_keyslots = false;

    for line in output.lines() {
        let indent = line.len() - line.trim_start().len();
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("Keyslots:") {
            in_keyslots = true;
            continue;
        }
        if indent == 0 && line.ends_with(':') && !line.starts_with("Keyslots") {
            // Next top-level section (Tokens:, Digests:, ...).
            in_keyslots = false;
        }

        if in_keyslots && indent == 2 {
            // LUKS2 slot rows look like "0: luks2"; LUKS1 like
            // "Key Slot 0: ENABLED" at top level, handled below.
            if let Some((slot, _)) = line.split_once(':') {
                if let Ok(slot) = slot.trim().parse() {
                    info.key_slots.push(slot);
                }
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("Key Slot ") {
            if let Some((slot, state)) = rest.split_once(':') {
                if state.trim() == "ENABLED" {
                    if let Ok(slot) = slot.trim().parse() {
                        info.key_slots.push(slot);
                    }
                }
            }
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    let take = |fields: &BTreeMap<String, String>, key: &str| {
        fields.get(key).filter(|v| !v.is_empty() && *v != "(no label)").cloned()
    };

    info.version = take(&fields, "Version");
    info.uuid = take(&fields, "UUID");
    info.label = take(&fields, "Label");
    // LUKS1 reports "Cipher name"; LUKS2 lists the cipher per data segment.
    info.cipher = take(&fields, "Cipher name").or_else(|| take(&fields, "cipher"));

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    const LUKS2_DUMP: &str = "LUKS header information\n\
        Version:       \t2\n\
        Epoch:         \t3\n\
        Metadata area: \t16384 [bytes]\n\
        UUID:          \t6d1b4c2f-5a2c-4b0a-93c1-4d1b4c2f7a10\n\
        Label:         \t(no label)\n\
        Data segments:\n\
        \x20 0: crypt\n\
        \tcipher: aes-xts-plain64\n\
        Keyslots:\n\
        \x20 0: luks2\n\
        \tKey:        512 bits\n\
        \x20 1: luks2\n\
        \tKey:        512 bits\n\
        Tokens:\n\
        Digests:\n\
        \x20 0: pbkdf2\n";

    const LUKS1_DUMP: &str = "LUKS header information for /dev/sda2\n\
        Version:       \t1\n\
        Cipher name:   \taes\n\
        UUID:          \tabcd-1234\n\
        Key Slot 0: ENABLED\n\
        Key Slot 1: DISABLED\n\
        Key Slot 2: ENABLED\n";

    #[test]
    fn parses_luks2_dump() {
        let info = parse_luks_dump(LUKS2_DUMP);
        assert_eq!(info.version.as_deref(), Some("2"));
        assert_eq!(
            info.uuid.as_deref(),
            Some("6d1b4c2f-5a2c-4b0a-93c1-4d1b4c2f7a10")
        );
        assert_eq!(info.label, None);
        assert_eq!(info.cipher.as_deref(), Some("aes-xts-plain64"));
        assert_eq!(info.key_slots, vec![0, 1]);
    }

    #[test]
    fn parses_luks1_dump() {
        let info = parse_luks_dump(LUKS1_DUMP);
        assert_eq!(info.version.as_deref(), Some("1"));
        assert_eq!(info.cipher.as_deref(), Some("aes"));
        assert_eq!(info.key_slots, vec![0, 2]);
    }

    #[test]
    fn mapper_paths() {
        assert_eq!(
            mapper_path("cryptroot"),
            PathBuf::from("/dev/mapper/cryptroot")
        );
    }
}

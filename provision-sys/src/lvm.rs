// SPDX-License-Identifier: GPL-3.0-only

//! LVM tool operations

use std::path::{Path, PathBuf};

use crate::cmd::{run_capture, run_query};
use crate::Result;

pub fn pv_create(device: &Path) -> Result<()> {
    run_capture("pvcreate", &["--yes", &device.display().to_string()])?;
    Ok(())
}

pub fn vg_create(name: &str, pvs: &[PathBuf]) -> Result<()> {
    let mut args: Vec<String> = vec!["--yes".to_string(), name.to_string()];
    for pv in pvs {
        args.push(pv.display().to_string());
    }
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run_capture("vgcreate", &args)?;
    Ok(())
}

/// Create a logical volume sized either absolutely (`-L 8G`) or in
/// extents (`-l 100%FREE`).
pub fn lv_create(vg: &str, name: &str, size: Option<&str>, extents: Option<&str>) -> Result<()> {
    let mut args: Vec<&str> = vec!["--yes", "--name", name];
    match (size, extents) {
        (Some(size), _) => {
            args.push("-L");
            args.push(size);
        }
        (None, Some(extents)) => {
            args.push("-l");
            args.push(extents);
        }
        (None, None) => {
            return Err(crate::SysError::OperationFailed(format!(
                "logical volume {vg}/{name} has neither size nor extents"
            )))
        }
    }
    args.push(vg);
    run_capture("lvcreate", &args)?;
    Ok(())
}

/// Stable device path of a logical volume.
pub fn lv_path(vg: &str, lv: &str) -> PathBuf {
    PathBuf::from("/dev").join(vg).join(lv)
}

/// Whether the logical volume exists and is active.
pub fn lv_active(vg: &str, lv: &str) -> Result<bool> {
    let target = format!("{vg}/{lv}");
    let Some(output) = run_query(
        "lvs",
        &[
            "--noheadings",
            "-o",
            "lv_active",
            "--separator",
            "\t",
            &target,
        ],
    )?
    else {
        return Ok(false);
    };
    Ok(parse_lv_active(&output))
}

fn parse_lv_active(output: &str) -> bool {
    output
        .lines()
        .any(|line| {
            let state = line.trim();
            state.eq_ignore_ascii_case("active") || state == "y"
        })
}

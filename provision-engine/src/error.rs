// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use provision_sys::SysError;
use provision_types::{GeometryError, ValidationError};
use thiserror::Error;

/// Engine error taxonomy. Every kind aborts the current run; nothing is
/// retried and no partial state is rolled back.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("geometry resolution failed: {0}")]
    Geometry(#[from] GeometryError),

    /// A destructive call was attempted against a currently-mounted
    /// device. Cannot be bypassed by configuration.
    #[error("refusing destructive operation: {device} is mounted at {mount_point}")]
    Safety {
        device: PathBuf,
        mount_point: PathBuf,
    },

    /// An operation was invoked before its required precondition state.
    #[error("invalid state: {0}")]
    State(String),

    #[error("external tool failed: {0}")]
    Tool(#[from] SysError),

    #[error("registry entry for {device} conflicts with an existing entry")]
    RegistryConflict { device: String },

    #[error("unresolvable device reference: {0}")]
    UnknownReference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("required tool not found: {0}")]
    ToolMissing(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("unparseable tool output: {0}")]
    ParseFailed(String),
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;

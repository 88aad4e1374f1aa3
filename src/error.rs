//! Unified error types for Brig

use crate::jail::ffi::Operation;
use crate::jail::registry::ParamType;
use nix::errno::Errno;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Brig operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Parameter codec errors
    #[error("Unknown jail parameter '{0}'")]
    UnknownParameter(String),

    #[error("Parameter '{name}' is {expected}, not {found}")]
    TypeMismatch {
        name: String,
        expected: ParamType,
        found: &'static str,
    },

    #[error("Malformed value for parameter '{name}': {reason}")]
    MalformedValue { name: String, reason: String },

    #[error("Parameter '{0}' is already bound in this transaction")]
    DuplicateBinding(String),

    // Kernel errors
    #[error("jail {op} failed: {}", kernel_message(.errno, .message))]
    KernelCallFailed {
        op: Operation,
        errno: Errno,
        message: String,
    },

    #[error("No more jails to enumerate")]
    EnumerationExhausted,

    // Jail errors
    #[error("Jail handle {0} was destroyed")]
    InvalidHandle(i32),

    #[error("Jail '{0}' not found")]
    JailNotFound(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to create C string: {0}")]
    CString(#[from] std::ffi::NulError),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn kernel_message(errno: &Errno, message: &str) -> String {
    if message.is_empty() {
        errno.desc().to_string()
    } else {
        format!("{} ({})", message, errno)
    }
}

impl Error {
    /// Kernel errno carried by a failed kernel call, if any
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::KernelCallFailed { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

/// Result type alias for Brig operations
pub type Result<T> = std::result::Result<T, Error>;

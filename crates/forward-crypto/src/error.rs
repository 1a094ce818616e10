//! Identity and known-hosts store error types.

use std::path::PathBuf;

/// Errors from loading or persisting local key material.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Identity file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Identity file {path} has insecure permissions: {mode:o} (expected owner-only)")]
    InsecurePermissions { path: PathBuf, mode: u32 },

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Known hosts file {path} is corrupt: {reason}")]
    KnownHostsCorrupt { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

//! Error types for Forward core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Option resolution and validation errors. Every variant is fatal to the
/// run and its message is shown to the user verbatim.
#[derive(Debug, Error)]
pub enum Error {
    /// Option file could not be read, parsed, or was not a mapping
    #[error("Unable to parse {}", path.display())]
    OptionFile { path: PathBuf, reason: String },

    #[error("Invalid Port: {0} is an invalid port number")]
    InvalidPort(u32),

    #[error("`{0}' is an invalid username format")]
    InvalidUsername(String),

    /// The offending password is never echoed back
    #[error("password has an invalid format")]
    InvalidPassword,

    #[error("`{0}' is an invalid domain format")]
    InvalidCname(String),

    #[error("`{0}' is an invalid subdomain prefix format")]
    InvalidSubdomainPrefix(String),

    #[error("Basic Auth: bad format, expecting USER:PASS")]
    BasicAuthFormat,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

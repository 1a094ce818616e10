//! Forward Core Library
//!
//! Shared functionality for the Forward tunnel client:
//! - Forwarding target parsing and option validation
//! - Layered option resolution (defaults, `Forwardfile`, command line)
//! - Diagnostic log sink selection and tracing setup
//! - Common error types

pub mod config;
pub mod error;
pub mod forwarded;
pub mod tracing_init;
pub mod validate;

pub use config::{Credentials, OptionLayer, TunnelRequest};
pub use error::{Error, Result};
pub use forwarded::{Forwarded, parse_forwarded};
pub use tracing_init::{DebugLogSink, DebugMode, LogSink};

/// Client version reported to the control API.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Detailed client identification sent with every tunnel request.
pub fn client_string() -> String {
    format!(
        "[{}]::[rust-{}]::[rust-client-{}]",
        std::env::consts::OS,
        std::env::consts::ARCH,
        VERSION
    )
}

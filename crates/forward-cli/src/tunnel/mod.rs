//! Remote tunnel lifecycle on the control API.
//!
//! Creates tunnels (recovering from the account's tunnel limit by letting
//! the user free a slot), waits for them to become reachable, and removes
//! them on request.

pub mod config;
pub mod error;
pub mod resource;

pub use config::PollPolicy;
pub use error::{TunnelError, TunnelUnreachable};
pub use resource::TunnelResource;

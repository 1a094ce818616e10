//! Forward identity library
//!
//! Owns the local key material that authenticates the client to the
//! tunneler's SSH endpoint.
//!
//! - **Identity**: Ed25519 keypair, one per local environment
//! - **Store**: hex-encoded seed at `~/.forward/identity.key`, mode 0600
//! - **Known hosts**: tunnel server host keys pinned on first use

pub mod error;
pub mod identity;
pub mod known_hosts;
pub mod store;

pub use error::ConfigError;
pub use identity::{Identity, SEED_LEN, fingerprint_of};
pub use known_hosts::{HostKeyCheck, KNOWN_HOSTS_FILE, KnownHosts, host_id};
pub use store::{ConfigStore, IDENTITY_FILE, LoadedIdentity};

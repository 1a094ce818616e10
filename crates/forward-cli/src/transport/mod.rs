//! Encrypted transport carrying the reverse forward.
//!
//! The supervisor only sees [`Transport`] and [`TransportSession`]; the
//! SSH implementation lives in [`ssh`].

pub mod ssh;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use forward_crypto::SEED_LEN;

pub use ssh::SshTransport;

/// Default login user on the tunnel servers.
pub const DEFAULT_SSH_USER: &str = "tunnel";

/// Default SSH port on the tunnel servers.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Errors from the transport session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Host key for {host} has changed (expected {expected}, got {actual})")]
    HostKeyChanged {
        host: String,
        expected: String,
        actual: String,
    },

    #[error("Cannot check the server host key: {0}")]
    HostKeyStore(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Forwarding error: {0}")]
    Forward(String),
}

/// Where the transport connects and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// File pinning the server host keys seen so far.
    pub known_hosts: PathBuf,
}

/// A remote port on the tunnel server relayed to a local service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseForward {
    pub bind_address: String,
    pub remote_port: u16,
    pub local_host: String,
    pub local_port: u16,
}

/// Opens transport sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `target` and authenticate with the identity's private seed.
    async fn open(
        &self,
        target: &TransportTarget,
        private_key: &[u8; SEED_LEN],
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}

/// An authenticated transport session.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Ask the server to relay connections on a remote port back to a
    /// local service.
    async fn forward_remote(&self, forward: &ReverseForward) -> Result<(), TransportError>;

    /// Whether traffic is in flight or has passed since the previous call.
    fn is_busy(&self) -> bool;

    async fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<(), TransportError>;
}

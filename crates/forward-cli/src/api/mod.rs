//! Control API integration.
//!
//! Provides a reqwest-based client for the tunnel control API: tunnel
//! lifecycle (create, list, show, destroy), tunnel key registration,
//! API token exchange and debug log submission.

mod client;
pub mod types;


use async_trait::async_trait;

pub use client::{ApiError, DEFAULT_API_URL, HttpControlApi};
pub use types::{
    ApiUser, CreateTunnelParams, ErrorEnvelope, FieldErrors, TunnelRecord, TunnelSummary,
};

/// Operations the client needs from the control API.
///
/// Implemented over HTTP by [`HttpControlApi`]; tests substitute fakes.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Use `token` for every subsequent authenticated request.
    fn authorize(&self, token: &str);

    /// Request a new tunnel.
    async fn create_tunnel(&self, params: &CreateTunnelParams) -> Result<TunnelRecord, ApiError>;

    /// Tunnels currently held by the account.
    async fn list_tunnels(&self) -> Result<Vec<TunnelSummary>, ApiError>;

    /// Current server-side view of a tunnel, `None` when it does not exist.
    async fn show_tunnel(&self, id: &str) -> Result<Option<TunnelRecord>, ApiError>;

    /// Remove a tunnel. Removing one that is already gone succeeds.
    async fn destroy_tunnel(&self, id: &str) -> Result<(), ApiError>;

    /// Register an OpenSSH public key the transport will authenticate with.
    async fn register_tunnel_key(&self, public_key: &str) -> Result<(), ApiError>;

    /// Exchange account email and password for an API token.
    async fn api_token(&self, email: &str, password: &str) -> Result<ApiUser, ApiError>;

    /// Upload captured diagnostic output.
    async fn submit_client_log(&self, log: String) -> Result<(), ApiError>;
}

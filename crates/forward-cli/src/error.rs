//! Client error taxonomy and its mapping to user-facing outcomes.

use std::io;
use std::path::Path;

use forward_crypto::ConfigError;

use crate::api::ApiError;
use crate::transport::TransportError;
use crate::tunnel::{TunnelError, TunnelUnreachable};

pub const SUPPORT_EMAIL: &str = "support@forwardhq.com";

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure,
}

impl Exit {
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

/// Everything that can end a client run.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Options(#[from] forward_core::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Unreachable(#[from] TunnelUnreachable),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Control API request failed: {0}")]
    Api(#[from] ApiError),

    #[error("Unable to authenticate with email and password")]
    Login(#[source] ApiError),

    #[error("Unable to save account configuration: {0}")]
    Settings(String),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] io::Error),

    /// The user quit the tunnel-limit menu.
    #[error("exiting...")]
    UserAbort,
}

impl ClientError {
    /// The message shown to the user and the resulting exit status.
    ///
    /// `identity_path` is named in the advice for authentication failures.
    pub fn outcome(&self, identity_path: &Path) -> (String, Exit) {
        let unable_to_create =
            || format!("Unable to create a tunnel. If this continues contact {SUPPORT_EMAIL}");

        let message = match self {
            Self::UserAbort => return (self.to_string(), Exit::Success),
            Self::Options(e) => e.to_string(),
            Self::Config(e) => e.to_string(),
            Self::Login(_) => self.to_string(),
            Self::Tunnel(
                e @ (TunnelError::Validation { .. }
                | TunnelError::TrialExpired(_)
                | TunnelError::AccountSuspended(_)
                | TunnelError::LimitReached(_)),
            ) => e.to_string(),
            Self::Tunnel(TunnelError::NotFound | TunnelError::Api(_)) | Self::Unreachable(_) => {
                unable_to_create()
            }
            Self::Transport(e @ TransportError::HostKeyChanged { .. }) => {
                format!("{e}. If the problem continues, contact {SUPPORT_EMAIL}")
            }
            Self::Transport(TransportError::AuthenticationFailed) => format!(
                "Authentication failed, try deleting `{}' and giving it another go. \
                 If the problem continues, contact {SUPPORT_EMAIL}",
                identity_path.display()
            ),
            Self::Transport(_) | Self::Api(_) | Self::Settings(_) | Self::Prompt(_) => {
                DISCONNECTED.to_string()
            }
        };
        (message, Exit::Failure)
    }
}

/// Shown for failures the user cannot act on directly.
pub const DISCONNECTED: &str = "You've been disconnected...";

//! Tunnel resource on the control API.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use forward_core::TunnelRequest;

use super::config::PollPolicy;
use super::error::{TunnelError, TunnelUnreachable};
use crate::api::{ControlApi, CreateTunnelParams, TunnelRecord, TunnelSummary};
use crate::console::Console;
use crate::error::ClientError;
use crate::prompt::{Choice, Prompt};

/// Menu heading shown when the account is at its tunnel limit.
pub const LIMIT_PROMPT: &str = "Choose a tunnel to close, or quit";

/// Printed after a tunnel has been freed to make room.
pub const SLOT_FREED: &str = "tunnel removed, now we're creating a new one";

/// Steps of tunnel creation when the account may be at its limit.
#[derive(Debug)]
enum Recovery {
    Requesting,
    LimitReached { message: String },
    AwaitingChoice {
        message: String,
        tunnels: Vec<TunnelSummary>,
    },
    Retrying { destroy_id: String },
}

/// Client for the account's tunnels.
pub struct TunnelResource {
    api: Arc<dyn ControlApi>,
    prompt: Arc<dyn Prompt>,
    console: Console,
    poll: PollPolicy,
    client: String,
}

impl TunnelResource {
    pub fn new(api: Arc<dyn ControlApi>, prompt: Arc<dyn Prompt>, console: Console) -> Self {
        Self {
            api,
            prompt,
            console,
            poll: PollPolicy::default(),
            client: forward_core::client_string(),
        }
    }

    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Request one tunnel for `request`. No retries.
    pub async fn create(&self, request: &TunnelRequest) -> Result<TunnelRecord, TunnelError> {
        let params = CreateTunnelParams::from_request(request, &self.client);
        let record = self
            .api
            .create_tunnel(&params)
            .await
            .map_err(TunnelError::from_api)?;
        info!(id = %record.id, subdomain = %record.subdomain, "Tunnel created");
        Ok(record)
    }

    /// Create a tunnel, letting the user close an existing one whenever the
    /// account is at its limit. Quitting the menu yields
    /// [`ClientError::UserAbort`]; any other failure ends the attempt.
    pub async fn create_with_recovery(
        &self,
        request: &TunnelRequest,
    ) -> Result<TunnelRecord, ClientError> {
        let mut state = Recovery::Requesting;
        loop {
            debug!(?state, "Tunnel creation step");
            state = match state {
                Recovery::Requesting => match self.create(request).await {
                    Ok(record) => return Ok(record),
                    Err(TunnelError::LimitReached(message)) => Recovery::LimitReached { message },
                    Err(e) => return Err(e.into()),
                },
                Recovery::LimitReached { message } => {
                    let tunnels = self.list().await?;
                    Recovery::AwaitingChoice { message, tunnels }
                }
                Recovery::AwaitingChoice { message, tunnels } => {
                    if !message.is_empty() {
                        self.console.line(&message);
                    }
                    let items: Vec<String> = tunnels
                        .iter()
                        .map(|t| format!("Forwarding port {}", t.hostport))
                        .collect();
                    match self.prompt.choose(LIMIT_PROMPT, &items)? {
                        Choice::Selected(index) => match tunnels.get(index) {
                            Some(tunnel) => Recovery::Retrying {
                                destroy_id: tunnel.id.clone(),
                            },
                            None => Recovery::AwaitingChoice { message, tunnels },
                        },
                        Choice::Quit => return Err(ClientError::UserAbort),
                    }
                }
                Recovery::Retrying { destroy_id } => {
                    self.destroy(&destroy_id).await?;
                    self.console.line(SLOT_FREED);
                    Recovery::Requesting
                }
            };
        }
    }

    /// Wait until the server reports the tunnel ready, checking at most
    /// [`PollPolicy::max_attempts`] times.
    pub async fn poll_status(&self, record: &TunnelRecord) -> Result<(), TunnelUnreachable> {
        let mut attempt: u32 = 0;
        loop {
            match self.api.show_tunnel(&record.id).await {
                Ok(Some(current)) if current.is_ready() => {
                    debug!(id = %record.id, attempt, "Tunnel ready");
                    return Ok(());
                }
                Ok(Some(current)) => {
                    debug!(id = %record.id, state = ?current.state, "Tunnel not ready yet");
                }
                Ok(None) => debug!(id = %record.id, "Tunnel not visible yet"),
                Err(e) => warn!(id = %record.id, error = %e, "Tunnel status check failed"),
            }

            attempt = attempt.saturating_add(1);
            if !self.poll.should_retry(attempt) {
                return Err(TunnelUnreachable {
                    id: record.id.clone(),
                    attempts: attempt,
                });
            }
            sleep(self.poll.delay_for_attempt(attempt - 1)).await;
        }
    }

    /// Tunnels currently held by the account.
    pub async fn list(&self) -> Result<Vec<TunnelSummary>, TunnelError> {
        self.api.list_tunnels().await.map_err(TunnelError::from_api)
    }

    /// Remove a tunnel. Already-removed tunnels are not an error.
    pub async fn destroy(&self, id: &str) -> Result<(), TunnelError> {
        self.api
            .destroy_tunnel(id)
            .await
            .map_err(TunnelError::from_api)?;
        info!(id, "Tunnel destroyed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;

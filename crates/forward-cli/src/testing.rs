//! In-memory collaborators for exercising the client flows.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use forward_crypto::SEED_LEN;

use crate::api::{
    ApiError, ApiUser, ControlApi, CreateTunnelParams, ErrorEnvelope, TunnelRecord, TunnelSummary,
};
use crate::transport::{
    ReverseForward, Transport, TransportError, TransportSession, TransportTarget,
};

/// A tunnel record as the control API would return it.
pub fn record(id: &str) -> TunnelRecord {
    TunnelRecord {
        id: id.into(),
        subdomain: "foo".into(),
        cname: None,
        vhost: Some("127.0.0.1".into()),
        hostport: 3000,
        remote_port: 56789,
        tunneler_host: "tunnel1.example.test".into(),
        idle_timeout: 0,
        state: None,
    }
}

pub fn summary(id: &str, hostport: u16) -> TunnelSummary {
    TunnelSummary {
        id: id.into(),
        hostport,
    }
}

/// A structured rejection from the control API.
pub fn rejected(kind: &str, message: &str) -> ApiError {
    ApiError::Rejected {
        status: 422,
        envelope: ErrorEnvelope {
            kind: kind.into(),
            message: message.into(),
            ..ErrorEnvelope::default()
        },
    }
}

#[derive(Default)]
struct ApiState {
    token: Option<String>,
    granted_token: Option<String>,
    create_results: VecDeque<Result<TunnelRecord, ApiError>>,
    default_record: Option<TunnelRecord>,
    tunnels: Vec<TunnelSummary>,
    pending_checks: u32,
    hidden: bool,
    created: Vec<CreateTunnelParams>,
    destroyed: Vec<String>,
    keys: Vec<String>,
    failing_key_registrations: u32,
    logs: Vec<String>,
    log_delay: Option<Duration>,
    show_calls: u32,
}

/// Scripted control API that records every call.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<ApiState>,
}

impl FakeApi {
    fn state(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept the next login and hand out `token`.
    pub fn grant_token(&self, token: &str) {
        self.state().granted_token = Some(token.into());
    }

    /// Queue the outcome of the next create request.
    pub fn respond_to_create(&self, result: Result<TunnelRecord, ApiError>) {
        self.state().create_results.push_back(result);
    }

    /// Record returned by create once the queue is empty.
    pub fn default_record(&self, record: TunnelRecord) {
        self.state().default_record = Some(record);
    }

    pub fn hold_tunnels(&self, tunnels: Vec<TunnelSummary>) {
        self.state().tunnels = tunnels;
    }

    /// Report the tunnel as pending for the next `checks` status checks.
    pub fn pending_for(&self, checks: u32) {
        self.state().pending_checks = checks;
    }

    /// Never show the tunnel.
    pub fn hide_tunnels(&self) {
        self.state().hidden = true;
    }

    /// Fail the next `times` key registrations with a server error.
    pub fn fail_key_registration(&self, times: u32) {
        self.state().failing_key_registrations = times;
    }

    /// Make each log submission take `delay` before it is recorded.
    pub fn slow_log_submission(&self, delay: Duration) {
        self.state().log_delay = Some(delay);
    }

    pub fn token(&self) -> Option<String> {
        self.state().token.clone()
    }

    pub fn created(&self) -> Vec<CreateTunnelParams> {
        self.state().created.clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.state().destroyed.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().keys.clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.state().logs.clone()
    }

    pub fn show_calls(&self) -> u32 {
        self.state().show_calls
    }
}

#[async_trait]
impl ControlApi for FakeApi {
    fn authorize(&self, token: &str) {
        self.state().token = Some(token.into());
    }

    async fn create_tunnel(&self, params: &CreateTunnelParams) -> Result<TunnelRecord, ApiError> {
        let mut state = self.state();
        state.created.push(params.clone());
        let fallback = state.default_record.clone().unwrap_or_else(|| record("1"));
        state.create_results.pop_front().unwrap_or(Ok(fallback))
    }

    async fn list_tunnels(&self) -> Result<Vec<TunnelSummary>, ApiError> {
        Ok(self.state().tunnels.clone())
    }

    async fn show_tunnel(&self, id: &str) -> Result<Option<TunnelRecord>, ApiError> {
        let mut state = self.state();
        state.show_calls += 1;
        if state.hidden {
            return Ok(None);
        }
        let pending = state.pending_checks > 0;
        state.pending_checks = state.pending_checks.saturating_sub(1);
        Ok(Some(TunnelRecord {
            state: pending.then(|| "pending".to_string()),
            ..record(id)
        }))
    }

    async fn destroy_tunnel(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        state.destroyed.push(id.into());
        state.tunnels.retain(|t| t.id != id);
        Ok(())
    }

    async fn register_tunnel_key(&self, public_key: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        if state.failing_key_registrations > 0 {
            state.failing_key_registrations -= 1;
            return Err(ApiError::Rejected {
                status: 503,
                envelope: ErrorEnvelope::default(),
            });
        }
        state.keys.push(public_key.into());
        Ok(())
    }

    async fn api_token(&self, email: &str, _password: &str) -> Result<ApiUser, ApiError> {
        match self.state().granted_token.clone() {
            Some(api_token) => Ok(ApiUser {
                email: Some(email.into()),
                api_token,
            }),
            None => Err(rejected("unauthorized", "Invalid email or password")),
        }
    }

    async fn submit_client_log(&self, log: String) -> Result<(), ApiError> {
        let delay = self.state().log_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state().logs.push(log);
        Ok(())
    }
}

/// Transport session whose state is driven by the test.
#[derive(Default)]
pub struct FakeSession {
    pub closed: AtomicBool,
    pub busy: AtomicBool,
    pub close_calls: AtomicUsize,
    forwards: Mutex<Vec<ReverseForward>>,
}

impl FakeSession {
    pub fn forwards(&self) -> Vec<ReverseForward> {
        self.forwards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn forward_remote(&self, forward: &ReverseForward) -> Result<(), TransportError> {
        self.forwards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(forward.clone());
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport handing out a single shared [`FakeSession`].
#[derive(Default)]
pub struct FakeTransport {
    pub session: Arc<FakeSession>,
    pub reject_auth: bool,
    targets: Mutex<Vec<TransportTarget>>,
}

impl FakeTransport {
    pub fn rejecting_auth() -> Self {
        Self {
            reject_auth: true,
            ..Self::default()
        }
    }

    pub fn targets(&self) -> Vec<TransportTarget> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(
        &self,
        target: &TransportTarget,
        _private_key: &[u8; SEED_LEN],
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.clone());
        if self.reject_auth {
            return Err(TransportError::AuthenticationFailed);
        }
        Ok(Arc::clone(&self.session) as Arc<dyn TransportSession>)
    }
}

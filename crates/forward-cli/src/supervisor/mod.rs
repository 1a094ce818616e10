//! Client supervisor: drives one run from login to exit.
//!
//! The sequence is fixed: authenticate against the control API, load the
//! tunnel identity (a new one is registered before it is written to disk),
//! create the tunnel with limit recovery, wait for it to become reachable,
//! open the transport with a reverse forward, then watch the session until
//! it ends. Every outcome, success or failure, funnels through [`Teardown`].

pub mod registry;
pub mod teardown;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use forward_core::{DebugLogSink, TunnelRequest};
use forward_crypto::{ConfigStore, KnownHosts};

pub use registry::{ActivityCounter, SessionRegistry};
pub use teardown::{INTERRUPTED, Teardown};

use crate::api::{ControlApi, TunnelRecord};
use crate::auth;
use crate::console::Console;
use crate::error::{ClientError, Exit};
use crate::prompt::Prompt;
use crate::transport::{
    DEFAULT_SSH_PORT, DEFAULT_SSH_USER, ReverseForward, Transport, TransportError,
    TransportSession, TransportTarget,
};
use crate::tunnel::{PollPolicy, TunnelResource};

/// Domain public tunnel URLs live under.
pub const PUBLIC_DOMAIN: &str = "fwd.wf";

/// Address the tunnel server binds the remote port to.
const REMOTE_BIND_ADDRESS: &str = "127.0.0.1";

/// Comment attached to the registered public key.
const KEY_COMMENT: &str = "forward";

const SUPERVISION_TICK: Duration = Duration::from_millis(250);
const IDLE_CLOCK: Duration = Duration::from_secs(1);

/// Where the supervisor keeps state and how it reaches the tunnel servers.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub config_dir: PathBuf,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub public_domain: String,
}

impl SupervisorSettings {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_dir,
            ssh_port: DEFAULT_SSH_PORT,
            ssh_user: DEFAULT_SSH_USER.to_string(),
            public_domain: PUBLIC_DOMAIN.to_string(),
        }
    }
}

/// How a supervised session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    Idle { seconds: u64 },
    Interrupted,
}

impl Ended {
    fn message(self) -> String {
        match self {
            Self::Idle { seconds } => {
                format!("Tunnel has been idle for {seconds} seconds, closing tunnel and exiting...")
            }
            Self::Interrupted => INTERRUPTED.to_string(),
        }
    }
}

pub struct ClientSupervisor {
    settings: SupervisorSettings,
    api: Arc<dyn ControlApi>,
    prompt: Arc<dyn Prompt>,
    transport: Arc<dyn Transport>,
    registry: Arc<SessionRegistry>,
    teardown: Arc<Teardown>,
    tunnels: TunnelResource,
    console: Console,
}

impl ClientSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        api: Arc<dyn ControlApi>,
        prompt: Arc<dyn Prompt>,
        transport: Arc<dyn Transport>,
        debug_log: Arc<DebugLogSink>,
        console: Console,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::default());
        let teardown = Arc::new(Teardown::new(
            Arc::clone(&registry),
            Arc::clone(&api),
            debug_log,
            console.clone(),
        ));
        let tunnels = TunnelResource::new(Arc::clone(&api), Arc::clone(&prompt), console.clone());
        Self {
            settings,
            api,
            prompt,
            transport,
            registry,
            teardown,
            tunnels,
            console,
        }
    }

    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.tunnels = self.tunnels.with_poll_policy(poll);
        self
    }

    /// Shared teardown, for the interrupt handler.
    pub fn teardown(&self) -> Arc<Teardown> {
        Arc::clone(&self.teardown)
    }

    /// Run the client to completion and return the process exit status.
    pub async fn start(&self, request: &TunnelRequest) -> Exit {
        let store = ConfigStore::in_dir(&self.settings.config_dir);
        let (message, exit) = match self.run(&store, request).await {
            Ok(ended) => (ended.message(), Exit::Success),
            Err(e) => {
                if !matches!(e, ClientError::UserAbort) {
                    error!(error = %e, detail = ?e, "Client run failed");
                }
                e.outcome(store.path())
            }
        };
        self.teardown.run(&message, exit).await
    }

    async fn run(&self, store: &ConfigStore, request: &TunnelRequest) -> Result<Ended, ClientError> {
        info!(local = %format!("{}:{}", request.local_host, request.local_port), "Starting client");
        auth::ensure_api_token(
            self.api.as_ref(),
            self.prompt.as_ref(),
            &self.console,
            &self.settings.config_dir,
        )
        .await?;

        let api = Arc::clone(&self.api);
        let loaded = store
            .create_or_load(|identity| {
                let public_key = identity.openssh_public_key(KEY_COMMENT);
                async move {
                    api.register_tunnel_key(&public_key)
                        .await
                        .map_err(ClientError::from)
                }
            })
            .await?;
        if loaded.created {
            info!(fingerprint = %loaded.identity.fingerprint(), "Registered new tunnel key");
        }

        let record = self.tunnels.create_with_recovery(request).await?;
        self.tunnels.poll_status(&record).await?;

        let target = TransportTarget {
            host: record.tunneler_host.clone(),
            port: self.settings.ssh_port,
            user: self.settings.ssh_user.clone(),
            known_hosts: KnownHosts::path_in(&self.settings.config_dir),
        };
        let private_key = store.private_key()?;
        let session = self.transport.open(&target, &private_key).await?;
        if !self.registry.install(Arc::clone(&session)) {
            let _ = session.close().await;
            return Ok(Ended::Interrupted);
        }

        session
            .forward_remote(&ReverseForward {
                bind_address: REMOTE_BIND_ADDRESS.to_string(),
                remote_port: record.remote_port,
                local_host: request.local_host.clone(),
                local_port: request.local_port,
            })
            .await?;
        self.console.line(&forwarding_message(
            &record,
            request,
            &self.settings.public_domain,
        ));

        self.supervise(&record, session.as_ref()).await
    }

    /// Watch the session until it closes or stays idle past the tunnel's
    /// timeout.
    async fn supervise(
        &self,
        record: &TunnelRecord,
        session: &dyn TransportSession,
    ) -> Result<Ended, ClientError> {
        let mut watch = interval(SUPERVISION_TICK);
        watch.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut clock = interval(IDLE_CLOCK);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
        clock.tick().await;

        loop {
            tokio::select! {
                _ = watch.tick() => {
                    if self.registry.is_closed() {
                        return Ok(Ended::Interrupted);
                    }
                    if session.is_closed().await {
                        return Err(TransportError::ConnectionLost(
                            "session closed by the server".into(),
                        )
                        .into());
                    }
                    if session.is_busy() {
                        self.registry.activity().reset();
                    }
                }
                _ = clock.tick() => {
                    let idle = self.registry.activity().advance();
                    if record.idle_timeout > 0 && idle >= record.idle_timeout {
                        info!(idle, timeout = record.idle_timeout, "Idle timeout reached");
                        return Ok(Ended::Idle { seconds: idle });
                    }
                }
            }
        }
    }
}

/// The line telling the user where their service is reachable.
pub fn forwarding_message(record: &TunnelRecord, request: &TunnelRequest, domain: &str) -> String {
    let mut remote = format!("https://{}.{domain}", record.subdomain);
    if let Some(cname) = record.cname_alias() {
        remote.push_str(" and http://");
        remote.push_str(cname);
    }

    let port = if record.hostport == 0 {
        request.local_port
    } else {
        record.hostport
    };
    let vhost = record
        .vhost
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(&request.local_host);
    let local = if vhost.parse::<Ipv4Addr>().is_ok() {
        format!("port {port}")
    } else if port == 80 {
        vhost.to_string()
    } else {
        format!("{vhost} port {port}")
    };

    format!("Forwarding {local} to {remote}\nCtrl-C to stop forwarding")
}

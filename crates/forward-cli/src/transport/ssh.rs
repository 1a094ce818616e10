//! SSH transport built on russh.
//!
//! The client authenticates with the Ed25519 tunnel identity, requests a
//! remote TCP forward and bridges every forwarded channel the server opens
//! to the local service. Server host keys are pinned on first use.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::keys::ssh_key::HashAlg;
use russh::keys::ssh_key::private::{Ed25519Keypair, KeypairData};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use russh::{Channel, Disconnect, Preferred, cipher};
use tokio::io::{AsyncWriteExt, copy_bidirectional};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use forward_crypto::{HostKeyCheck, KnownHosts, SEED_LEN, host_id};

use super::{ReverseForward, Transport, TransportError, TransportSession, TransportTarget};

const KEY_COMMENT: &str = "forward";
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Traffic bookkeeping shared between the handler and the session.
#[derive(Debug, Default)]
struct Activity {
    open_channels: AtomicUsize,
    touched: AtomicBool,
}

impl Activity {
    fn is_busy(&self) -> bool {
        let touched = self.touched.swap(false, Ordering::SeqCst);
        touched || self.open_channels.load(Ordering::SeqCst) > 0
    }
}

/// Decrements the open-channel count when a bridged channel finishes.
struct ChannelGuard(Arc<Activity>);

impl ChannelGuard {
    fn open(activity: &Arc<Activity>) -> Self {
        activity.open_channels.fetch_add(1, Ordering::SeqCst);
        activity.touched.store(true, Ordering::SeqCst);
        Self(Arc::clone(activity))
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.0.open_channels.fetch_sub(1, Ordering::SeqCst);
        self.0.touched.store(true, Ordering::SeqCst);
    }
}

type LocalTarget = Arc<RwLock<Option<(String, u16)>>>;

/// Checks server host keys against the pinned set and remembers why a key
/// was refused, since the handler can only answer yes or no.
struct HostKeyVerifier {
    known_hosts: PathBuf,
    host: String,
    rejection: Arc<StdMutex<Option<TransportError>>>,
}

impl HostKeyVerifier {
    fn new(target: &TransportTarget) -> Self {
        Self {
            known_hosts: target.known_hosts.clone(),
            host: host_id(&target.host, target.port),
            rejection: Arc::default(),
        }
    }

    fn accept(&self, fingerprint: &str) -> bool {
        let refused = match KnownHosts::verify(&self.known_hosts, &self.host, fingerprint) {
            Ok(HostKeyCheck::TrustOnFirstUse | HostKeyCheck::Matched) => return true,
            Ok(HostKeyCheck::Mismatch { expected, actual }) => TransportError::HostKeyChanged {
                host: self.host.clone(),
                expected,
                actual,
            },
            Err(e) => TransportError::HostKeyStore(e.to_string()),
        };
        *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = Some(refused);
        false
    }

    fn take_rejection(rejection: &StdMutex<Option<TransportError>>) -> Option<TransportError> {
        rejection.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

struct ForwardHandler {
    local: LocalTarget,
    activity: Arc<Activity>,
    host_keys: HostKeyVerifier,
}

impl client::Handler for ForwardHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        debug!(host = %self.host_keys.host, fingerprint = %fingerprint, "Checking server host key");
        Ok(self.host_keys.accept(&fingerprint))
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        let target = self
            .local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some((host, port)) = target else {
            warn!(connected_address, connected_port, "Forwarded channel with no local target");
            let _ = channel.close().await;
            return Ok(());
        };

        debug!(
            originator = %format!("{originator_address}:{originator_port}"),
            local = %format!("{host}:{port}"),
            "Bridging forwarded connection"
        );
        let guard = ChannelGuard::open(&self.activity);
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = bridge(channel, &host, port).await {
                debug!(error = %e, "Forwarded connection ended with error");
            }
        });
        Ok(())
    }
}

async fn bridge(channel: Channel<Msg>, host: &str, port: u16) -> std::io::Result<()> {
    let mut local = TcpStream::connect((host, port)).await?;
    let mut remote = channel.into_stream();
    let result = copy_bidirectional(&mut local, &mut remote).await;
    let _ = remote.shutdown().await;
    let _ = local.shutdown().await;
    match result {
        Ok(_) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::ConnectionReset
            ) =>
        {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Opens SSH sessions to the tunnel servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshTransport;

impl SshTransport {
    fn client_config() -> client::Config {
        client::Config {
            preferred: Preferred {
                cipher: Cow::Borrowed(&[cipher::CHACHA20_POLY1305]),
                ..Preferred::default()
            },
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..client::Config::default()
        }
    }

    fn private_key(seed: &[u8; SEED_LEN]) -> Result<PrivateKey, TransportError> {
        let keypair = Ed25519Keypair::from_seed(seed);
        PrivateKey::new(KeypairData::Ed25519(keypair), KEY_COMMENT)
            .map_err(|e| TransportError::Connection(format!("Unusable identity key: {e}")))
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(
        &self,
        target: &TransportTarget,
        private_key: &[u8; SEED_LEN],
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        let local: LocalTarget = Arc::new(RwLock::new(None));
        let activity = Arc::new(Activity::default());
        let host_keys = HostKeyVerifier::new(target);
        let rejection = Arc::clone(&host_keys.rejection);
        let handler = ForwardHandler {
            local: Arc::clone(&local),
            activity: Arc::clone(&activity),
            host_keys,
        };

        debug!(host = %target.host, port = target.port, user = %target.user, "Connecting transport");
        let mut handle = client::connect(
            Arc::new(Self::client_config()),
            (target.host.as_str(), target.port),
            handler,
        )
        .await
        .map_err(|e| {
            HostKeyVerifier::take_rejection(&rejection)
                .unwrap_or_else(|| TransportError::Connection(e.to_string()))
        })?;

        let key = Self::private_key(private_key)?;
        let fingerprint = key.public_key().fingerprint(HashAlg::Sha256);
        let auth = handle
            .authenticate_publickey(&target.user, PrivateKeyWithHashAlg::new(Arc::new(key), None))
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        if !auth.success() {
            return Err(TransportError::AuthenticationFailed);
        }
        info!(host = %target.host, fingerprint = %fingerprint, "Transport authenticated");

        Ok(Arc::new(SshSession {
            handle: Mutex::new(handle),
            local,
            activity,
        }))
    }
}

struct SshSession {
    handle: Mutex<Handle<ForwardHandler>>,
    local: LocalTarget,
    activity: Arc<Activity>,
}

#[async_trait]
impl TransportSession for SshSession {
    async fn forward_remote(&self, forward: &ReverseForward) -> Result<(), TransportError> {
        *self.local.write().unwrap_or_else(PoisonError::into_inner) =
            Some((forward.local_host.clone(), forward.local_port));

        let bound = self
            .handle
            .lock()
            .await
            .tcpip_forward(forward.bind_address.clone(), u32::from(forward.remote_port))
            .await
            .map_err(|e| TransportError::Forward(e.to_string()))?;
        info!(
            remote_port = forward.remote_port,
            bound,
            local = %format!("{}:{}", forward.local_host, forward.local_port),
            "Reverse forward established"
        );
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.activity.is_busy()
    }

    async fn is_closed(&self) -> bool {
        self.handle.lock().await.is_closed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        let handle = self.handle.lock().await;
        if handle.is_closed() {
            return Ok(());
        }
        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))
    }
}

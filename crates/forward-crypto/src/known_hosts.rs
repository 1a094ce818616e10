//! Trust-on-first-use store for tunnel server host keys.
//!
//! The first host key presented by a `host:port` is pinned in a JSON file
//! next to the identity. Later connections to the same endpoint must present
//! a key with the same fingerprint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// File name of the pinned host keys inside the config directory.
pub const KNOWN_HOSTS_FILE: &str = "known_hosts.json";

/// A pinned server key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHost {
    pub fingerprint: String,
    /// Unix seconds when the key was first accepted.
    pub first_seen: u64,
}

/// Pinned host keys keyed by `host:port`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnownHosts {
    #[serde(default)]
    pub hosts: BTreeMap<String, KnownHost>,
}

/// Outcome of comparing a presented key with the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyCheck {
    TrustOnFirstUse,
    Matched,
    Mismatch { expected: String, actual: String },
}

/// Store key for an endpoint.
pub fn host_id(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

impl KnownHosts {
    /// `known_hosts.json` in the given directory.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(KNOWN_HOSTS_FILE)
    }

    /// Load the store. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| ConfigError::KnownHostsCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::KnownHostsCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn check(&self, host: &str, fingerprint: &str) -> HostKeyCheck {
        match self.hosts.get(host) {
            None => HostKeyCheck::TrustOnFirstUse,
            Some(known) if known.fingerprint == fingerprint => HostKeyCheck::Matched,
            Some(known) => HostKeyCheck::Mismatch {
                expected: known.fingerprint.clone(),
                actual: fingerprint.to_string(),
            },
        }
    }

    /// Pin `fingerprint` for `host` unless a key is already pinned.
    pub fn record(&mut self, host: &str, fingerprint: &str, now: u64) {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| KnownHost {
                fingerprint: fingerprint.to_string(),
                first_seen: now,
            });
    }

    /// Check a presented key against the file at `path`, pinning it on
    /// first use.
    pub fn verify(path: &Path, host: &str, fingerprint: &str) -> Result<HostKeyCheck, ConfigError> {
        let mut store = Self::load(path)?;
        let check = store.check(host, fingerprint);
        match &check {
            HostKeyCheck::TrustOnFirstUse => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_or(0, |d| d.as_secs());
                store.record(host, fingerprint, now);
                store.save(path)?;
                info!(host, fingerprint, "Pinned new server host key");
            }
            HostKeyCheck::Matched => {}
            HostKeyCheck::Mismatch { expected, actual } => {
                warn!(host, expected = %expected, actual = %actual, "Server host key changed");
            }
        }
        Ok(check)
    }
}

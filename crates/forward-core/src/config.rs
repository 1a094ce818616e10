//! Option resolution for Forward.
//!
//! Implements layered option resolution:
//! 1. Built-in defaults (`127.0.0.1:80`)
//! 2. Option file (`./Forwardfile`, YAML mapping)
//! 3. Command-line arguments (highest priority)

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::forwarded::Forwarded;
use crate::validate;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 80;

/// Name of the per-directory option file.
pub const OPTION_FILE: &str = "Forwardfile";

/// One layer of options. Unset fields defer to lower-priority layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OptionLayer {
    pub host: Option<String>,
    pub port: Option<u32>,
    pub subdomain_prefix: Option<String>,
    pub cname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub no_auth: Option<bool>,
    /// `USER:PASS` shorthand, expanded into `username`/`password` on load.
    pub auth: Option<String>,
}

impl OptionLayer {
    /// The built-in defaults.
    pub fn defaults() -> Self {
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(u32::from(DEFAULT_PORT)),
            ..Self::default()
        }
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            subdomain_prefix: other.subdomain_prefix.or(self.subdomain_prefix),
            cname: other.cname.or(self.cname),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
            no_auth: other.no_auth.or(self.no_auth),
            auth: None,
        }
    }

    /// Overlay the parts of a forwarding target that were given.
    #[must_use]
    pub fn with_forwarded(self, forwarded: Forwarded) -> Self {
        self.merge(Self {
            host: forwarded.host,
            port: forwarded.port,
            ..Self::default()
        })
    }

    /// Validate every set field and build the immutable request.
    pub fn resolve(self) -> Result<TunnelRequest> {
        debug!(options = ?self.redacted(), "Validating options");

        let port = validate::validate_port(self.port.unwrap_or(u32::from(DEFAULT_PORT)))?;
        if let Some(prefix) = &self.subdomain_prefix {
            validate::validate_subdomain_prefix(prefix)?;
        }
        if let Some(cname) = &self.cname {
            validate::validate_cname(cname)?;
        }
        if let Some(username) = &self.username {
            validate::validate_username(username)?;
        }
        if let Some(password) = &self.password {
            validate::validate_password(password)?;
        }

        let credentials = match (self.username, self.password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        Ok(TunnelRequest {
            local_host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            local_port: port,
            subdomain_prefix: self.subdomain_prefix,
            cname: self.cname,
            credentials,
            no_auth: self.no_auth.unwrap_or(false),
        })
    }

    fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "xxxx".to_string()),
            ..self.clone()
        }
    }

    fn expand_auth(mut self) -> Result<Self> {
        if let Some(auth) = self.auth.take() {
            let (username, password) = validate::parse_basic_auth(&auth)?;
            self.username.get_or_insert(username);
            self.password.get_or_insert(password);
        }
        Ok(self)
    }
}

/// HTTP basic-auth credentials protecting the public endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A fully validated tunnel request. Passed unchanged through retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub local_host: String,
    pub local_port: u16,
    pub subdomain_prefix: Option<String>,
    pub cname: Option<String>,
    pub credentials: Option<Credentials>,
    pub no_auth: bool,
}

impl Default for TunnelRequest {
    fn default() -> Self {
        Self {
            local_host: DEFAULT_HOST.to_string(),
            local_port: DEFAULT_PORT,
            subdomain_prefix: None,
            cname: None,
            credentials: None,
            no_auth: false,
        }
    }
}

/// `Forwardfile` in the given directory.
pub fn option_file_path(dir: &Path) -> PathBuf {
    dir.join(OPTION_FILE)
}

/// Load an option file. The document must be a YAML mapping; keys may be
/// written with a leading colon (`:port: 3000`).
pub fn load_option_file(path: &Path) -> Result<OptionLayer> {
    let parse_error = |reason: String| Error::OptionFile {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;

    let serde_yaml::Value::Mapping(mapping) = value else {
        return Err(parse_error("document is not a mapping".into()));
    };

    let normalized: serde_yaml::Mapping = mapping
        .into_iter()
        .map(|(key, value)| match key {
            serde_yaml::Value::String(s) => {
                (serde_yaml::Value::String(s.trim_start_matches(':').to_string()), value)
            }
            other => (other, value),
        })
        .collect();

    let layer: OptionLayer = serde_yaml::from_value(serde_yaml::Value::Mapping(normalized))
        .map_err(|e| parse_error(e.to_string()))?;
    let layer = layer.expand_auth()?;
    debug!(path = %path.display(), options = ?layer.redacted(), "Loaded option file");
    Ok(layer)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn write_option_file(dir: &Path, body: &str) -> PathBuf {
        let path = option_file_path(dir);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_resolve_to_loopback_port_80() {
        let request = OptionLayer::defaults().resolve().unwrap();
        assert_eq!(request, TunnelRequest::default());
        assert_eq!(request.local_host, "127.0.0.1");
        assert_eq!(request.local_port, 80);
    }

    #[test]
    fn later_layer_wins() {
        let file = OptionLayer {
            port: Some(8000),
            cname: Some("foo.com".into()),
            ..OptionLayer::default()
        };
        let cli = OptionLayer {
            port: Some(3000),
            ..OptionLayer::default()
        };
        let merged = OptionLayer::defaults().merge(file).merge(cli);
        assert_eq!(merged.port, Some(3000));
        assert_eq!(merged.cname.as_deref(), Some("foo.com"));
        assert_eq!(merged.host.as_deref(), Some(DEFAULT_HOST));
    }

    #[test]
    fn credentials_need_both_halves() {
        let request = OptionLayer {
            username: Some("alice".into()),
            ..OptionLayer::defaults()
        }
        .resolve()
        .unwrap();
        assert!(request.credentials.is_none());
    }

    #[test]
    fn resolve_rejects_invalid_port() {
        let err = OptionLayer::defaults()
            .with_forwarded(Forwarded {
                host: None,
                port: Some(65536),
            })
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPort(65536)));
    }

    #[test]
    fn loads_mapping_option_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_option_file(
            dir.path(),
            "port: 8000\nsubdomain_prefix: foo\ncname: foo.example.com\n",
        );
        let layer = load_option_file(&path).unwrap();
        assert_eq!(layer.port, Some(8000));
        assert_eq!(layer.subdomain_prefix.as_deref(), Some("foo"));
        assert_eq!(layer.cname.as_deref(), Some("foo.example.com"));
    }

    #[test]
    fn accepts_symbol_style_keys_and_auth_shorthand() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_option_file(dir.path(), "---\n:auth: username:password\n:port: 3000\n");
        let layer = load_option_file(&path).unwrap();
        assert_eq!(layer.username.as_deref(), Some("username"));
        assert_eq!(layer.password.as_deref(), Some("password"));
        assert_eq!(layer.port, Some(3000));
    }

    #[test]
    fn non_mapping_option_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_option_file(dir.path(), "--- username:password\n");
        match load_option_file(&path).unwrap_err() {
            Error::OptionFile { path: p, .. } => assert_eq!(p, path),
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn unreadable_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_option_file(dir.path(), "port: [unclosed\n");
        assert!(matches!(
            load_option_file(&path),
            Err(Error::OptionFile { .. })
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let request = OptionLayer {
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            ..OptionLayer::defaults()
        }
        .resolve()
        .unwrap();
        assert!(!format!("{request:?}").contains("hunter2"));
    }
}

//! Account configuration management.
//!
//! Persists the account email and API token to `~/.forward/config.json`,
//! next to the tunnel identity key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the account configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// Persistent account configuration.
#[derive(Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Token sent as a bearer credential to the control API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("email", &self.email)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CliConfig {
    /// Path to the config file inside `dir`.
    pub fn config_path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Load config from disk. Returns default if file doesn't exist or is invalid.
    pub fn load(dir: &Path) -> Self {
        std::fs::read_to_string(Self::config_path(dir))
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to disk, readable by the owner only.
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = Self::config_path(dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Stored token, ignoring blank values.
    pub fn token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

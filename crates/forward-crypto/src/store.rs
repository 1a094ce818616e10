//! Persistent identity store.
//!
//! The identity file holds the hex-encoded Ed25519 seed followed by a
//! newline. It is created with mode 0600 and refused on load if any group
//! or other permission bit is set. A fresh identity is written only after
//! the caller has registered it, so a file on disk is always a key the
//! server knows.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::ConfigError;
use crate::identity::{Identity, SEED_LEN};

/// File name of the identity inside the config directory.
pub const IDENTITY_FILE: &str = "identity.key";

/// Result of [`ConfigStore::create_or_load`].
#[derive(Debug)]
pub struct LoadedIdentity {
    pub identity: Identity,
    /// `true` when the identity was generated by this call.
    pub created: bool,
}

/// Sole owner of the on-disk identity file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at `dir`, using `dir/identity.key`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(IDENTITY_FILE),
        }
    }

    /// Default per-user location: `~/.forward/identity.key`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".forward"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the identity, or generate one when the file is absent.
    ///
    /// A generated identity is passed to `register` first and persisted only
    /// if that succeeds; on failure nothing is written and the next call
    /// starts over with a new key.
    pub async fn create_or_load<F, Fut, E>(&self, register: F) -> Result<LoadedIdentity, E>
    where
        F: FnOnce(&Identity) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<ConfigError>,
    {
        if self.path.exists() {
            let identity = self.load()?;
            debug!(path = %self.path.display(), "Loaded existing identity");
            return Ok(LoadedIdentity {
                identity,
                created: false,
            });
        }

        let identity = Identity::generate();
        register(&identity).await?;
        self.save(&identity)?;
        info!(
            path = %self.path.display(),
            fingerprint = %identity.fingerprint(),
            "Generated new identity"
        );
        Ok(LoadedIdentity {
            identity,
            created: true,
        })
    }

    /// Read the private key material for the transport session.
    pub fn private_key(&self) -> Result<Zeroizing<[u8; SEED_LEN]>, ConfigError> {
        Ok(self.load()?.private_key())
    }

    fn load(&self) -> Result<Identity, ConfigError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&self.path)?.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                return Err(ConfigError::InsecurePermissions {
                    path: self.path.clone(),
                    mode,
                });
            }
        }

        let contents = Zeroizing::new(std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                self.corrupt("not valid UTF-8")
            } else {
                ConfigError::IoError(e)
            }
        })?);
        let seed = Zeroizing::new(
            hex::decode(contents.trim()).map_err(|e| self.corrupt(&e.to_string()))?,
        );
        Identity::from_seed_bytes(&seed).map_err(|e| self.corrupt(&e.to_string()))
    }

    fn save(&self, identity: &Identity) -> Result<(), ConfigError> {
        let dir = self.path.parent().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        })?;
        std::fs::create_dir_all(dir)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        let encoded = Zeroizing::new(hex::encode(*identity.private_key()));
        file.write_all(encoded.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    }

    fn corrupt(&self, reason: &str) -> ConfigError {
        ConfigError::Corrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::future::{Ready, ready};

    use super::*;

    fn accept(_: &Identity) -> Ready<Result<(), ConfigError>> {
        ready(Ok(()))
    }

    fn write_key_file(path: &Path, data: &[u8]) {
        std::fs::write(path, data).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).unwrap();
        }
    }

    #[tokio::test]
    async fn creates_identity_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(&dir.path().join("nested"));

        let loaded = store.create_or_load(accept).await.unwrap();
        assert!(loaded.created);
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn second_call_returns_identical_key_material() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());

        let first = store.create_or_load(accept).await.unwrap();
        let second = store.create_or_load(accept).await.unwrap();
        assert!(!second.created);
        assert_eq!(
            *first.identity.private_key(),
            *second.identity.private_key()
        );
        assert_eq!(*store.private_key().unwrap(), *first.identity.private_key());
    }

    #[tokio::test]
    async fn file_bytes_unchanged_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        store.create_or_load(accept).await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        store.create_or_load(accept).await.unwrap();
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn created_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        store.create_or_load(accept).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rejects_group_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        store.create_or_load(accept).await.unwrap();
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o640)).unwrap();

        match store.create_or_load(accept).await.unwrap_err() {
            ConfigError::InsecurePermissions { mode, .. } => assert_eq!(mode, 0o640),
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_non_hex_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        write_key_file(store.path(), b"not a key at all\n");

        assert!(matches!(
            store.create_or_load(accept).await.unwrap_err(),
            ConfigError::Corrupt { .. }
        ));
    }

    #[tokio::test]
    async fn rejects_truncated_seed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        write_key_file(store.path(), hex::encode([7u8; 20]).as_bytes());

        assert!(matches!(
            store.create_or_load(accept).await.unwrap_err(),
            ConfigError::Corrupt { .. }
        ));
    }

    #[tokio::test]
    async fn loads_seed_written_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        let identity = Identity::generate();
        write_key_file(
            store.path(),
            format!("{}\n", hex::encode(*identity.private_key())).as_bytes(),
        );

        let loaded = store.create_or_load(accept).await.unwrap();
        assert!(!loaded.created);
        assert_eq!(loaded.identity.public_bytes(), identity.public_bytes());
    }

    #[tokio::test]
    async fn failed_registration_leaves_no_identity_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());

        let err = store
            .create_or_load(|_| ready(Err(ConfigError::IoError(std::io::ErrorKind::TimedOut.into()))))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
        assert!(!store.path().exists());

        let retried = store.create_or_load(accept).await.unwrap();
        assert!(retried.created);
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn registers_the_key_it_persists_and_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::in_dir(dir.path());
        let registered = Cell::new(None);
        let calls = Cell::new(0);
        let register = |identity: &Identity| {
            registered.set(Some(identity.public_bytes()));
            calls.set(calls.get() + 1);
            ready(Ok::<_, ConfigError>(()))
        };

        let created = store.create_or_load(register).await.unwrap();
        assert_eq!(registered.get(), Some(created.identity.public_bytes()));

        let reloaded = store
            .create_or_load(|_: &Identity| {
                calls.set(calls.get() + 1);
                ready(Ok::<_, ConfigError>(()))
            })
            .await
            .unwrap();
        assert!(!reloaded.created);
        assert_eq!(calls.get(), 1);
        assert_eq!(reloaded.identity.public_bytes(), created.identity.public_bytes());
    }
}

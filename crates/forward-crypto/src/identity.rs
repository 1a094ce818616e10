//! Identity keypair management.
//!
//! Each local environment has one long-lived Ed25519 keypair that
//! authenticates the client to the tunneler's SSH endpoint.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::{Zeroize, Zeroizing};

use crate::error::ConfigError;

/// Length of an Ed25519 seed in bytes.
pub const SEED_LEN: usize = 32;

const OPENSSH_KEY_TYPE: &str = "ssh-ed25519";

/// An Ed25519 identity keypair used for the transport session.
pub struct Identity {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public", &hex::encode(self.verifying.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Identity {
    /// Generate a new random identity keypair.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    /// Reconstruct from a raw 32-byte seed.
    pub fn from_seed_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() != SEED_LEN {
            return Err(ConfigError::InvalidKeyLength {
                expected: SEED_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SEED_LEN];
        arr.copy_from_slice(bytes);
        let signing = SigningKey::from_bytes(&arr);
        arr.zeroize();
        let verifying = signing.verifying_key();
        Ok(Self { signing, verifying })
    }

    /// The private seed. Handle with care.
    pub fn private_key(&self) -> Zeroizing<[u8; SEED_LEN]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// The public key as raw bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.verifying.to_bytes()
    }

    /// Render the public key in `authorized_keys` format.
    pub fn openssh_public_key(&self, comment: &str) -> String {
        let mut blob = Vec::with_capacity(4 + OPENSSH_KEY_TYPE.len() + 4 + 32);
        for field in [OPENSSH_KEY_TYPE.as_bytes(), self.verifying.as_bytes()] {
            let len = u32::try_from(field.len()).unwrap_or(u32::MAX);
            blob.extend_from_slice(&len.to_be_bytes());
            blob.extend_from_slice(field);
        }
        let encoded = STANDARD.encode(blob);
        if comment.is_empty() {
            format!("{OPENSSH_KEY_TYPE} {encoded}")
        } else {
            format!("{OPENSSH_KEY_TYPE} {encoded} {comment}")
        }
    }

    /// Compute a human-readable hex fingerprint of the public key.
    ///
    /// Uses SHA-256 of the public key, formatted as colon-separated hex pairs.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(self.verifying.as_bytes())
    }
}

/// Compute a colon-separated hex fingerprint from raw public key bytes.
pub fn fingerprint_of(pubkey_bytes: &[u8; 32]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(pubkey_bytes);
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

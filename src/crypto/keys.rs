//! # Key Management
//!
//! The local identity's ephemeral key pair.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LocalIdentity (X25519)                                                 │
//! │  ───────────────────────                                                │
//! │                                                                         │
//! │  Lifetime:                                                              │
//! │  • Created once per login                                               │
//! │  • Never rotated, never persisted                                       │
//! │  • Zeroized when dropped                                                │
//! │                                                                         │
//! │  Format:                                                                │
//! │  • Private key: 32 bytes (kept in memory, no accessor)                  │
//! │  • Public key: 32 bytes (exported for key exchange)                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::provider::CryptoProvider;
use super::PUBLIC_KEY_SIZE;
use crate::error::{Error, Result};

/// The local user's key pair for this session
///
/// The secret half is only reachable through [`LocalIdentity::diffie_hellman`],
/// which is crate-private.
pub struct LocalIdentity {
    /// Authenticated local user id
    id: String,
    /// Private key (x25519_dalek zeroizes it on drop)
    secret: StaticSecret,
    /// Public key (derived from secret)
    public: X25519PublicKey,
}

impl LocalIdentity {
    /// Generate a fresh key pair for `id`
    ///
    /// The secret scalar is drawn from `provider`; fails with
    /// `CryptoUnavailable` when the provider cannot produce randomness.
    pub fn generate(id: impl Into<String>, provider: &dyn CryptoProvider) -> Result<Self> {
        let mut seed = [0u8; 32];
        provider.fill_random(&mut seed)?;

        let secret = StaticSecret::from(seed);
        seed.zeroize();
        let public = X25519PublicKey::from(&secret);

        let identity = Self {
            id: id.into(),
            secret,
            public,
        };

        tracing::info!(
            "Generated session identity for {} (key {}, provider {})",
            identity.id,
            identity.export_public().fingerprint(),
            provider.name()
        );

        Ok(identity)
    }

    /// The authenticated local user id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Export the public key for the key exchange
    pub fn export_public(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.public.to_bytes())
    }

    /// Raw X25519 Diffie-Hellman with a peer's public key
    ///
    /// Returns `None` when the result is not contributory, i.e. the peer sent
    /// a low-order point that forces a predictable shared secret.
    pub(crate) fn diffie_hellman(&self, their_public: &PublicKeyBytes) -> Option<[u8; 32]> {
        let their_public = X25519PublicKey::from(their_public.0);
        let shared = self.secret.diffie_hellman(&their_public);
        if shared.was_contributory() {
            Some(shared.to_bytes())
        } else {
            None
        }
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("id", &self.id)
            .field("public", &self.export_public().fingerprint())
            .finish_non_exhaustive()
    }
}

/// Canonical encoding of an X25519 public key (32 bytes)
///
/// Serialized as base64 in human-readable formats and as raw bytes otherwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes(#[serde(with = "crate::envelope::wire_bytes")] pub [u8; PUBLIC_KEY_SIZE]);

impl PublicKeyBytes {
    /// Build from an untrusted byte slice
    ///
    /// Fails with `InvalidPeerKey` unless the slice is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidPeerKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Short hex fingerprint for logs (first 8 bytes of SHA-256)
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({})", self.fingerprint())
    }
}

// ============================================================================
// TESTS
// ============================================================================

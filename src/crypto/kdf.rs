//! # Key Derivation
//!
//! Expands the raw ECDH output into the two keys a channel needs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 SHARED SECRET → CHANNEL KEYS                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  X25519 shared secret (32 bytes)                                        │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  HKDF-SHA256 extract(salt = 16 zero bytes, ikm = shared secret)         │
//! │                │                                                        │
//! │        ┌───────┴──────────────────────┐                                 │
//! │        ▼                              ▼                                 │
//! │  expand("AES-GCM encryption")   expand("HMAC authentication")           │
//! │        │                              │                                 │
//! │        ▼                              ▼                                 │
//! │  Encryption key (32 bytes)      Integrity key (32 bytes)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The salt and both labels are fixed and public. Different labels make the
//! two keys independent even though they come from one secret, and the
//! shared secret itself is unique per peer pair.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::KEY_SIZE;
use crate::error::{Error, Result};

/// Domain separation constants for HKDF
pub mod domain {
    /// Fixed public salt (16 zero bytes)
    pub const SALT: [u8; 16] = [0u8; 16];

    /// Label for the AEAD encryption key
    pub const ENCRYPTION_KEY: &[u8] = b"AES-GCM encryption";

    /// Label for the HMAC integrity key
    pub const INTEGRITY_KEY: &[u8] = b"HMAC authentication";
}

/// The symmetric keys of one established channel
///
/// Both keys are wiped when the value is dropped or explicitly zeroized.
/// Not `Clone` and not comparable outside tests: key bytes are never copied
/// or compared in variable time.
#[derive(Zeroize, ZeroizeOnDrop)]
#[cfg_attr(test, derive(Clone, PartialEq, Eq))]
pub struct ChannelKeys {
    encryption: [u8; KEY_SIZE],
    integrity: [u8; KEY_SIZE],
}

impl ChannelKeys {
    /// Build from raw key bytes
    pub fn from_bytes(encryption: [u8; KEY_SIZE], integrity: [u8; KEY_SIZE]) -> Self {
        Self {
            encryption,
            integrity,
        }
    }

    /// AES-256-GCM key
    pub(crate) fn encryption_key(&self) -> &[u8; KEY_SIZE] {
        &self.encryption
    }

    /// HMAC-SHA256 key
    pub(crate) fn integrity_key(&self) -> &[u8; KEY_SIZE] {
        &self.integrity
    }
}

impl std::fmt::Debug for ChannelKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChannelKeys(..)")
    }
}

/// Expand a raw ECDH shared secret into channel keys
pub fn expand_shared_secret(shared_secret: &[u8; 32]) -> Result<ChannelKeys> {
    let hkdf = Hkdf::<Sha256>::new(Some(&domain::SALT), shared_secret);

    let mut encryption = [0u8; KEY_SIZE];
    hkdf.expand(domain::ENCRYPTION_KEY, &mut encryption)
        .map_err(|_| Error::DerivationFailed("Failed to derive encryption key".into()))?;

    let mut integrity = [0u8; KEY_SIZE];
    hkdf.expand(domain::INTEGRITY_KEY, &mut integrity)
        .map_err(|_| Error::DerivationFailed("Failed to derive integrity key".into()))?;

    let keys = ChannelKeys::from_bytes(encryption, integrity);
    encryption.zeroize();
    integrity.zeroize();

    Ok(keys)
}

// ============================================================================
// TESTS
// ============================================================================

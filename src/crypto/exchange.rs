//! # Key Exchange
//!
//! Turns a peer's public key into the keys of our channel with them.
//!
//! ```text
//!  peer public key (untrusted bytes)
//!        │
//!        ├── 1. validate: 32 bytes, not a low-order point ──► InvalidPeerKey
//!        │
//!        ├── 2. X25519(local secret, peer public) → shared secret
//!        │
//!        └── 3. HKDF → (encryption key, integrity key)
//! ```
//!
//! Storing the result and advancing the channel state is the tracker's job
//! (see [`crate::channel`]); this module is pure.

use zeroize::Zeroize;

use super::kdf::{expand_shared_secret, ChannelKeys};
use super::keys::{LocalIdentity, PublicKeyBytes};
use crate::error::{Error, Result};

/// Derive the channel keys shared with `peer_id`
///
/// Both ends obtain identical keys: `derive(A, B.public) == derive(B, A.public)`.
/// Fails with `InvalidPeerKey` for a low-order or self key and
/// `DerivationFailed` only if HKDF itself fails.
pub fn derive_channel_keys(
    local: &LocalIdentity,
    peer_id: &str,
    peer_public: &PublicKeyBytes,
) -> Result<ChannelKeys> {
    if *peer_public == local.export_public() {
        return Err(Error::InvalidPeerKey(format!(
            "{} presented our own public key",
            peer_id
        )));
    }

    let mut shared = local.diffie_hellman(peer_public).ok_or_else(|| {
        Error::InvalidPeerKey(format!(
            "{} sent a low-order public key ({})",
            peer_id,
            peer_public.fingerprint()
        ))
    })?;

    let keys = expand_shared_secret(&shared);
    shared.zeroize();

    let keys = keys?;
    tracing::debug!(
        "Derived channel keys for {} from key {}",
        peer_id,
        peer_public.fingerprint()
    );
    Ok(keys)
}

// ============================================================================
// TESTS
// ============================================================================

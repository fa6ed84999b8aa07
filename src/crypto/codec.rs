//! # Message Codec
//!
//! Encrypts and decrypts single messages under a channel's keys.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENCRYPT (sender)                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. nonce      = 12 random bytes from the CryptoProvider                │
//! │  2. ciphertext = AES-256-GCM(enc_key, nonce, plaintext,                 │
//! │                              aad = version || sender_id)                │
//! │  3. tag        = HMAC-SHA256(int_key, nonce || ciphertext)              │
//! │                                                                         │
//! │  Output: MessageEnvelope { version, sender_id, ciphertext, nonce, tag } │
//! │                                                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                      DECRYPT (recipient)                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. version check                       ──► UnsupportedVersion          │
//! │  2. HMAC verify (constant time)         ──► IntegrityCheckFailed        │
//! │     (nothing is decrypted on failure)                                   │
//! │  3. AES-256-GCM decrypt                 ──► DecryptionFailed            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The HMAC tag sits on top of an AEAD that already authenticates. It is kept
//! so envelopes stay wire-compatible with clients that send and check it.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::kdf::ChannelKeys;
use super::provider::CryptoProvider;
use super::{NONCE_SIZE, TAG_SIZE};
use crate::envelope::{MessageEnvelope, PROTOCOL_VERSION};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Encrypt `plaintext` from `sender_id` under `keys`
pub fn encrypt(
    keys: &ChannelKeys,
    sender_id: &str,
    plaintext: &[u8],
    provider: &dyn CryptoProvider,
) -> Result<MessageEnvelope> {
    let mut nonce = [0u8; NONCE_SIZE];
    provider.fill_random(&mut nonce)?;

    let cipher = Aes256Gcm::new_from_slice(keys.encryption_key())
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let aad = build_aad(PROTOCOL_VERSION, sender_id);
    let ciphertext = cipher
        .encrypt(
            AesNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| Error::EncryptionFailed(format!("AES-GCM: {}", e)))?;

    let tag = compute_tag(keys, &nonce, &ciphertext)?;

    Ok(MessageEnvelope {
        version: PROTOCOL_VERSION,
        sender_id: sender_id.to_string(),
        ciphertext,
        nonce,
        tag,
    })
}

/// Verify and decrypt `envelope` under `keys`
///
/// The integrity tag is checked before any decryption is attempted.
pub fn decrypt(keys: &ChannelKeys, envelope: &MessageEnvelope) -> Result<Vec<u8>> {
    if envelope.version != PROTOCOL_VERSION {
        return Err(Error::UnsupportedVersion(envelope.version));
    }

    let mut mac = new_mac(keys)?;
    mac.update(&envelope.nonce);
    mac.update(&envelope.ciphertext);
    mac.verify_slice(&envelope.tag)
        .map_err(|_| Error::IntegrityCheckFailed)?;

    let cipher = Aes256Gcm::new_from_slice(keys.encryption_key())
        .map_err(|_| Error::DecryptionFailed)?;

    let aad = build_aad(envelope.version, &envelope.sender_id);
    cipher
        .decrypt(
            AesNonce::from_slice(&envelope.nonce),
            Payload {
                msg: &envelope.ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed)
}

fn new_mac(keys: &ChannelKeys) -> Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(keys.integrity_key())
        .map_err(|e| Error::DerivationFailed(format!("Invalid integrity key: {}", e)))
}

fn compute_tag(keys: &ChannelKeys, nonce: &[u8], ciphertext: &[u8]) -> Result<[u8; TAG_SIZE]> {
    let mut mac = new_mac(keys)?;
    mac.update(nonce);
    mac.update(ciphertext);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

/// AAD binds the ciphertext to the protocol version and the claimed sender
fn build_aad(version: u8, sender_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + sender_id.len());
    aad.push(version);
    aad.extend_from_slice(sender_id.as_bytes());
    aad
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::expand_shared_secret;
    use crate::crypto::{OsCryptoProvider, SeededCryptoProvider};

    fn keys(seed: u8) -> ChannelKeys {
        expand_shared_secret(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_basic() {
        let k = keys(42);
        let env = encrypt(&k, "alice", b"Hello, Bob!", &OsCryptoProvider).unwrap();
        assert_eq!(env.sender_id(), "alice");
        assert_eq!(env.tag().len(), TAG_SIZE);
        assert_eq!(decrypt(&k, &env).unwrap(), b"Hello, Bob!");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let k = keys(42);
        let env = encrypt(&k, "alice", b"", &OsCryptoProvider).unwrap();
        assert!(decrypt(&k, &env).unwrap().is_empty());
    }

    #[test]
    fn test_same_plaintext_twice_differs() {
        let k = keys(42);
        let e1 = encrypt(&k, "alice", b"same", &OsCryptoProvider).unwrap();
        let e2 = encrypt(&k, "alice", b"same", &OsCryptoProvider).unwrap();

        assert_ne!(e1.nonce(), e2.nonce());
        assert_ne!(e1.ciphertext(), e2.ciphertext());
        assert_eq!(decrypt(&k, &e1).unwrap(), b"same");
        assert_eq!(decrypt(&k, &e2).unwrap(), b"same");
    }

    #[test]
    fn test_seeded_provider_gives_distinct_nonces() {
        let k = keys(1);
        let provider = SeededCryptoProvider::new(99);
        let e1 = encrypt(&k, "alice", b"x", &provider).unwrap();
        let e2 = encrypt(&k, "alice", b"x", &provider).unwrap();
        assert_ne!(e1.nonce(), e2.nonce());
    }

    #[test]
    fn test_any_flipped_bit_fails_integrity() {
        let k = keys(42);
        let env = encrypt(&k, "alice", b"attack at dawn", &OsCryptoProvider).unwrap();

        for i in 0..env.ciphertext.len() * 8 {
            let mut t = env.clone();
            t.ciphertext[i / 8] ^= 1 << (i % 8);
            assert!(matches!(decrypt(&k, &t), Err(Error::IntegrityCheckFailed)));
        }
        for i in 0..NONCE_SIZE * 8 {
            let mut t = env.clone();
            t.nonce[i / 8] ^= 1 << (i % 8);
            assert!(matches!(decrypt(&k, &t), Err(Error::IntegrityCheckFailed)));
        }
        for i in 0..TAG_SIZE * 8 {
            let mut t = env.clone();
            t.tag[i / 8] ^= 1 << (i % 8);
            assert!(matches!(decrypt(&k, &t), Err(Error::IntegrityCheckFailed)));
        }
    }

    #[test]
    fn test_wrong_channel_fails_integrity() {
        let env = encrypt(&keys(1), "alice", b"secret", &OsCryptoProvider).unwrap();
        assert!(matches!(
            decrypt(&keys(2), &env),
            Err(Error::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn test_aead_rejects_when_hmac_passes() {
        // Same integrity key, different encryption key
        let sender = keys(1);
        let receiver = ChannelKeys::from_bytes([0xAB; 32], *sender.integrity_key());

        let env = encrypt(&sender, "alice", b"secret", &OsCryptoProvider).unwrap();
        assert!(matches!(decrypt(&receiver, &env), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_rewritten_sender_fails_aead() {
        let k = keys(5);
        let mut env = encrypt(&k, "alice", b"hi", &OsCryptoProvider).unwrap();
        env.sender_id = "mallory".into();
        assert!(matches!(decrypt(&k, &env), Err(Error::DecryptionFailed)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let k = keys(5);
        let mut env = encrypt(&k, "alice", b"hi", &OsCryptoProvider).unwrap();
        env.version = 9;
        assert!(matches!(decrypt(&k, &env), Err(Error::UnsupportedVersion(9))));
    }

    #[test]
    fn test_encrypt_without_entropy_fails() {
        use crate::crypto::provider::testing::FailingProvider;
        let err = encrypt(&keys(5), "alice", b"hi", &FailingProvider).unwrap_err();
        assert!(err.is_fatal());
    }
}

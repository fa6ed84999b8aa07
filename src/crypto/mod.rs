//! # Cryptography Module
//!
//! All cryptographic primitives used by SealChat Core.
//!
//! ## Channel Crypto Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    PER-PEER CHANNEL CRYPTOGRAPHY                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Key Pair: X25519 (ephemeral, one per login)          [keys]         │
//! │                                                                         │
//! │  2. Key Exchange: X25519 ECDH                            [exchange]     │
//! │     Alice's Private × Bob's Public = Shared Secret                     │
//! │                                                                         │
//! │  3. Key Derivation: HKDF-SHA256                          [kdf]          │
//! │     Shared Secret → (Encryption Key, Integrity Key)                    │
//! │                                                                         │
//! │  4. Message: AES-256-GCM + HMAC-SHA256                   [codec]        │
//! │     • 256-bit keys                                                      │
//! │     • 96-bit nonce (random per message)                                 │
//! │     • 128-bit AEAD tag + 256-bit HMAC tag                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Why Chosen |
//! |-----------|---------|------------|
//! | X25519 | Key Exchange | 128-bit security, rejects invalid encodings by construction |
//! | HKDF-SHA256 | Key Derivation | Extract-then-expand with labelled outputs |
//! | AES-256-GCM | Encryption | AEAD, hardware acceleration |
//! | HMAC-SHA256 | Integrity tag | Wire compatibility, verified before decrypting |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: secrets and channel keys are wiped on drop and reset
//! 2. **Constant-Time Comparison**: HMAC tags are checked with `verify_slice`
//! 3. **Injected Randomness**: everything random comes from a [`CryptoProvider`]
//! 4. **No Key Reuse**: a fresh nonce for every message

pub mod codec;
pub mod exchange;
pub mod kdf;
mod keys;
mod provider;

pub use exchange::derive_channel_keys;
pub use kdf::ChannelKeys;
pub use keys::{LocalIdentity, PublicKeyBytes};
pub use provider::{CryptoProvider, OsCryptoProvider, SeededCryptoProvider};

#[cfg(test)]
pub(crate) use provider::testing;

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the HMAC-SHA256 integrity tag in bytes
pub const TAG_SIZE: usize = 32;

/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

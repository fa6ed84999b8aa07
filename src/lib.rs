//! # SealChat Core
//!
//! Per-peer end-to-end encrypted channels for a relay-based chat client.
//! Each logged-in user gets an ephemeral key pair; every conversation partner
//! gets its own derived keys, and the relay only ever sees public keys and
//! sealed envelopes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SEALCHAT CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │                     Session Orchestrator                          │  │
//! │  │  select_peer · send_message · handle_event · logout               │  │
//! │  └───────┬──────────────────────┬──────────────────────┬────────────┘  │
//! │          │                      │                      │               │
//! │  ┌───────▼──────┐   ┌───────────▼──────────┐   ┌───────▼────────────┐  │
//! │  │   Channel    │   │       Crypto         │   │    Transport       │  │
//! │  │              │   │                      │   │                    │  │
//! │  │ - NoKey      │   │ - X25519 key pair    │   │ - Transport trait  │  │
//! │  │ - Initiated  │   │ - ECDH + HKDF        │   │ - InboundEvent     │  │
//! │  │ - Established│   │ - AES-GCM + HMAC     │   │ - MemoryRelay      │  │
//! │  │ - Replay     │   │ - CryptoProvider     │   │                    │  │
//! │  └──────────────┘   └──────────────────────┘   └────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  Envelope: MessageEnvelope · KeyExchangeMessage · WirePayload   │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Session configuration
//! - [`crypto`] - Key pairs, key exchange, key derivation, message codec
//! - [`envelope`] - Wire types (envelopes, key offers)
//! - [`channel`] - Per-peer channel state machine
//! - [`transport`] - Transport boundary and an in-memory relay
//! - [`session`] - The orchestrator tying it all together
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Confidentiality: AES-256-GCM under a key only the two peers can        │
//! │  derive (X25519 + HKDF-SHA256). The relay sees ciphertext only.         │
//! │                                                                         │
//! │  Integrity: HMAC-SHA256 over nonce || ciphertext, checked in constant   │
//! │  time before anything is decrypted, plus the AEAD tag.                  │
//! │                                                                         │
//! │  Sender binding: the claimed sender is AEAD associated data and must    │
//! │  match the transport-authenticated sender.                              │
//! │                                                                         │
//! │  Not covered: forward secrecy within a session, key rotation, and       │
//! │  authentication of public keys beyond what the relay provides.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sealchat_core::{MemoryRelay, OsCryptoProvider, SessionConfig, SessionOrchestrator};
//!
//! let relay = MemoryRelay::new();
//! let (endpoint, mut inbox) = relay.register("alice");
//! let alice = SessionOrchestrator::new(
//!     "alice",
//!     Arc::new(endpoint),
//!     Arc::new(OsCryptoProvider),
//!     SessionConfig::default(),
//! )?;
//!
//! alice.select_peer("bob").await?;
//! while let Some(event) = inbox.recv().await {
//!     alice.handle_event(event?).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod channel;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod session;
/// Wall-clock helpers.
pub mod time;
pub mod transport;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use channel::ChannelStatus;
pub use config::SessionConfig;
pub use crypto::{ChannelKeys, CryptoProvider, LocalIdentity, OsCryptoProvider, PublicKeyBytes, SeededCryptoProvider};
pub use envelope::{ExchangeKind, KeyExchangeMessage, MessageEnvelope, WirePayload};
pub use error::{Error, Result};
pub use session::{ConversationEntry, Direction, SessionEvent, SessionOrchestrator};
pub use transport::{InboundEvent, MemoryRelay, Transport};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of SealChat Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns the wire protocol version this build speaks
pub fn protocol_version() -> u8 {
    envelope::PROTOCOL_VERSION
}

// ============================================================================
// TESTS
// ============================================================================

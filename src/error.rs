//! # Error Handling
//!
//! Error types for SealChat Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Session Errors                                                    │
//! │  │   ├── InvalidConfig         - Bad session configuration             │
//! │  │   ├── NoActiveRecipient     - No peer selected                      │
//! │  │   └── SessionClosed         - Session was logged out                │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── CryptoUnavailable     - No key material can be produced (!!)  │
//! │  │   ├── InvalidPeerKey        - Peer public key rejected              │
//! │  │   ├── DerivationFailed      - HKDF / library failure                │
//! │  │   ├── EncryptionFailed      - AEAD refused to encrypt               │
//! │  │   ├── IntegrityCheckFailed  - HMAC tag mismatch                     │
//! │  │   └── DecryptionFailed      - AEAD rejected the ciphertext          │
//! │  │                                                                      │
//! │  ├── Channel Errors                                                    │
//! │  │   ├── ChannelNotReady       - Channel not Established yet           │
//! │  │   ├── UnknownSender         - No channel for the sender             │
//! │  │   ├── SenderMismatch        - Envelope sender ≠ transport sender    │
//! │  │   └── ReplayDetected        - Nonce already accepted                │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   ├── PeerUnreachable       - Relay could not deliver               │
//! │  │   └── TransportClosed       - Transport shut down                   │
//! │  │                                                                      │
//! │  └── Message Errors                                                    │
//! │      ├── MessageTooLarge       - Plaintext over the configured limit   │
//! │      ├── InvalidEnvelope       - Malformed wire data                   │
//! │      └── UnsupportedVersion    - Unknown envelope version              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `CryptoUnavailable` is fatal. Everything else is a per-peer
//! condition that leaves other peers' channels untouched.

use thiserror::Error;

/// Result type alias for SealChat Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Text shown to the user for any envelope that failed authentication.
///
/// Integrity and AEAD failures share this text so the UI is not an oracle.
pub const UNVERIFIED_MESSAGE_TEXT: &str = "Message could not be verified and was discarded.";

/// Main error type for SealChat Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Session Errors (100-199)
    // ========================================================================
    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No active recipient has been selected
    #[error("No active recipient selected.")]
    NoActiveRecipient,

    /// The session was logged out; its keys are gone
    #[error("Session is closed.")]
    SessionClosed,

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================
    /// The platform cannot produce key material or randomness
    #[error("Cryptography unavailable: {0}")]
    CryptoUnavailable(String),

    /// The peer's public key was rejected
    #[error("Invalid peer key: {0}")]
    InvalidPeerKey(String),

    /// Key derivation failed inside the library
    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The integrity tag did not match
    #[error("Integrity check failed")]
    IntegrityCheckFailed,

    /// The AEAD rejected the ciphertext
    #[error("Decryption failed")]
    DecryptionFailed,

    // ========================================================================
    // Channel Errors (400-499)
    // ========================================================================
    /// The channel with this peer is not established yet
    #[error("Secure channel with {0} is not ready yet.")]
    ChannelNotReady(String),

    /// Envelope from a peer we have no channel with
    #[error("No secure channel exists for sender {0}.")]
    UnknownSender(String),

    /// The sender named inside the payload differs from the transport sender
    #[error("Sender mismatch: transport says {transport}, payload says {claimed}")]
    SenderMismatch {
        /// Sender reported by the transport
        transport: String,
        /// Sender embedded in the payload
        claimed: String,
    },

    /// The envelope's nonce was already accepted on this channel
    #[error("Replayed envelope from {0}")]
    ReplayDetected(String),

    // ========================================================================
    // Transport Errors (500-599)
    // ========================================================================
    /// The relay could not deliver to the peer
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// The transport has been shut down
    #[error("Transport closed")]
    TransportClosed,

    // ========================================================================
    // Message Errors (700-799)
    // ========================================================================
    /// Plaintext exceeds the configured limit
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Actual size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Wire data could not be decoded into an envelope or key exchange
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Envelope protocol version is not supported
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// - 100-199: Session
    /// - 300-399: Crypto
    /// - 400-499: Channel
    /// - 500-599: Transport
    /// - 700-799: Messages
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_) => 100,
            Error::NoActiveRecipient => 101,
            Error::SessionClosed => 102,

            Error::CryptoUnavailable(_) => 300,
            Error::InvalidPeerKey(_) => 301,
            Error::DerivationFailed(_) => 302,
            Error::EncryptionFailed(_) => 303,
            Error::IntegrityCheckFailed => 304,
            Error::DecryptionFailed => 305,

            Error::ChannelNotReady(_) => 400,
            Error::UnknownSender(_) => 401,
            Error::SenderMismatch { .. } => 402,
            Error::ReplayDetected(_) => 403,

            Error::PeerUnreachable(_) => 500,
            Error::TransportClosed => 501,

            Error::MessageTooLarge { .. } => 700,
            Error::InvalidEnvelope(_) => 701,
            Error::UnsupportedVersion(_) => 702,

            Error::SerializationError(_) => 900,
        }
    }

    /// Whether the whole session must be abandoned
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CryptoUnavailable(_))
    }

    /// Whether retrying (usually after a fresh key exchange) can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ChannelNotReady(_)
                | Error::PeerUnreachable(_)
                | Error::UnknownSender(_)
                | Error::ReplayDetected(_)
        )
    }

    /// Whether this error means an inbound envelope was not trustworthy
    pub fn is_untrusted_message(&self) -> bool {
        matches!(self, Error::IntegrityCheckFailed | Error::DecryptionFailed)
    }

    /// Text suitable for showing to the end user
    ///
    /// Authentication failures collapse into one message; internal logs keep
    /// the distinction.
    pub fn user_message(&self) -> String {
        if self.is_untrusted_message() {
            UNVERIFIED_MESSAGE_TEXT.to_string()
        } else {
            self.to_string()
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

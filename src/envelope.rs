//! # Wire Types
//!
//! Everything SealChat puts on the transport.
//!
//! ## Envelope Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE ENVELOPE FORMAT                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  MessageEnvelope (JSON for text transports)                             │
//! │  {                                                                      │
//! │    "version": 1,                    // Protocol version                 │
//! │    "sender_id": "alice",            // Sender's user id                 │
//! │    "ciphertext": "base64...",       // AES-256-GCM output (+16B tag)    │
//! │    "nonce": "base64...",            // 12-byte nonce                    │
//! │    "tag": "base64..."               // 32-byte HMAC-SHA256              │
//! │  }                                                                      │
//! │                                                                         │
//! │  KeyExchangeMessage                                                     │
//! │  {                                                                      │
//! │    "version": 1,                                                        │
//! │    "sender_id": "alice",                                                │
//! │    "kind": "request" | "response",                                      │
//! │    "public_key": "base64..."        // 32-byte X25519 public key        │
//! │  }                                                                      │
//! │                                                                         │
//! │  Binary transports use bincode; the same fields are raw bytes.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKeyBytes, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// Current wire protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// An encrypted message as it travels over the relay
///
/// Built only by [`crate::crypto::codec::encrypt`] or by decoding wire data;
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub(crate) version: u8,
    pub(crate) sender_id: String,
    #[serde(with = "wire_bytes")]
    pub(crate) ciphertext: Vec<u8>,
    #[serde(with = "wire_bytes")]
    pub(crate) nonce: [u8; NONCE_SIZE],
    #[serde(with = "wire_bytes")]
    pub(crate) tag: [u8; TAG_SIZE],
}

impl MessageEnvelope {
    /// Protocol version
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Who claims to have sent this envelope
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// AEAD ciphertext (includes the AEAD's own 16-byte tag)
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The per-message nonce
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// HMAC-SHA256 over `nonce || ciphertext`
    pub fn tag(&self) -> &[u8; TAG_SIZE] {
        &self.tag
    }

    /// Serialize to JSON (base64 fields)
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }

    /// Serialize to compact binary
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from compact binary
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }
}

/// Whether a key-exchange message asks for a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Sent by the initiator; the receiver always answers
    Request,
    /// Sent in answer to a request; never answered
    Response,
}

/// A public key offered to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeMessage {
    /// Protocol version
    pub version: u8,
    /// Who is offering the key
    pub sender_id: String,
    /// Request or response
    pub kind: ExchangeKind,
    /// Sender's X25519 public key
    pub public_key: PublicKeyBytes,
}

impl KeyExchangeMessage {
    /// Build a message for the current protocol version
    pub fn new(sender_id: impl Into<String>, kind: ExchangeKind, public_key: PublicKeyBytes) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sender_id: sender_id.into(),
            kind,
            public_key,
        }
    }
}

/// Anything the orchestrator sends over one text or binary channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WirePayload {
    /// Key exchange request or response
    KeyExchange(KeyExchangeMessage),
    /// Encrypted chat message
    Envelope(MessageEnvelope),
}

impl WirePayload {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }

    /// Serialize to compact binary
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from compact binary
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::InvalidEnvelope(e.to_string()))
    }
}

/// Serde helper for binary fields
///
/// Base64 strings in human-readable formats (JSON), raw bytes otherwise
/// (bincode). Works for `Vec<u8>` and fixed-size arrays; length is checked
/// on the way in.
pub(crate) mod wire_bytes {
    use std::fmt;

    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&BASE64.encode(bytes.as_ref()))
        } else {
            serializer.serialize_bytes(bytes.as_ref())
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let raw = if deserializer.is_human_readable() {
            deserializer.deserialize_str(Base64Visitor)?
        } else {
            deserializer.deserialize_byte_buf(BytesVisitor)?
        };
        let len = raw.len();
        T::try_from(raw).map_err(|_| de::Error::invalid_length(len, &"a field of the expected size"))
    }

    struct Base64Visitor;

    impl<'de> Visitor<'de> for Base64Visitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a base64 string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<u8>, E> {
            BASE64.decode(v).map_err(E::custom)
        }
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a byte array")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                out.push(byte);
            }
            Ok(out)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

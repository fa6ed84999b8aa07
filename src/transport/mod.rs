//! # Transport
//!
//! The boundary between a session and whatever moves its bytes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TRANSPORT BOUNDARY                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   SessionOrchestrator                                                   │
//! │        │  send_key_exchange(to, msg)          ▲ InboundEvent            │
//! │        │  send_envelope(to, envelope)         │                         │
//! │        ▼                                      │                         │
//! │   ┌─────────────────────────────────────────────────────┐               │
//! │   │  Transport (relay, socket, in-memory hub, ...)       │               │
//! │   │  • authenticates who is sending                      │               │
//! │   │  • at-least-once, may reorder                        │               │
//! │   │  • sees only public keys and envelopes               │               │
//! │   └─────────────────────────────────────────────────────┘               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sends are fire and forget. A recipient that cannot be reached is reported
//! later as [`InboundEvent::PeerUnreachable`]; an `Err` from a send means the
//! local side of the transport itself is gone.

mod memory;

pub use memory::{MemoryRelay, RelayEndpoint, RelayInbox};

use async_trait::async_trait;

use crate::envelope::{KeyExchangeMessage, MessageEnvelope};
use crate::error::Result;

/// Outbound half of a transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a key-exchange message to `to`
    async fn send_key_exchange(&self, to: &str, message: KeyExchangeMessage) -> Result<()>;

    /// Deliver an encrypted envelope to `to`
    async fn send_envelope(&self, to: &str, envelope: MessageEnvelope) -> Result<()>;
}

/// Events a transport delivers to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A peer offered its public key
    KeyExchangeReceived {
        /// Transport-authenticated sender
        from: String,
        /// The offer
        message: KeyExchangeMessage,
    },

    /// A peer sent an encrypted message
    EnvelopeReceived {
        /// Transport-authenticated sender
        from: String,
        /// The envelope, still encrypted
        envelope: MessageEnvelope,
    },

    /// A peer came online
    PeerConnected(String),

    /// A peer went offline; its ephemeral keys are gone
    PeerDisconnected(String),

    /// Something we sent to this peer could not be delivered
    PeerUnreachable(String),
}

impl InboundEvent {
    /// The peer this event concerns
    pub fn peer(&self) -> &str {
        match self {
            Self::KeyExchangeReceived { from, .. } | Self::EnvelopeReceived { from, .. } => from,
            Self::PeerConnected(peer)
            | Self::PeerDisconnected(peer)
            | Self::PeerUnreachable(peer) => peer,
        }
    }
}

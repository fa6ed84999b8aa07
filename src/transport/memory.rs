//! In-memory relay.
//!
//! A hub that forwards opaque JSON frames between registered users, the way
//! a chat relay server does: users connect with their id, frames go only to
//! users that are online, and the sender hears back when a recipient is not.
//! Connect and disconnect notices are broadcast to everyone else online.
//!
//! The relay never parses what it forwards, so it never sees keys or
//! plaintext. Each user gets an unbounded `mpsc` inbox.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::{InboundEvent, Transport};
use crate::envelope::{KeyExchangeMessage, MessageEnvelope, WirePayload};
use crate::error::{Error, Result};

/// What the relay pushes into a user's inbox
#[derive(Debug, Clone)]
enum RelayFrame {
    Payload { from: String, data: String },
    Connected(String),
    Disconnected(String),
    Unreachable(String),
}

type FrameSender = mpsc::UnboundedSender<RelayFrame>;

/// Shared relay state
#[derive(Clone, Default)]
pub struct MemoryRelay {
    /// User id → inbox sender for online users
    online: Arc<RwLock<HashMap<String, FrameSender>>>,
}

impl MemoryRelay {
    /// Create an empty relay
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `user_id`, returning its outbound endpoint and inbox
    ///
    /// Registering an id that is already online replaces the old
    /// connection; its inbox is closed and everyone else sees a disconnect
    /// before the new connect.
    pub fn register(&self, user_id: impl Into<String>) -> (RelayEndpoint, RelayInbox) {
        let user_id = user_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut online = self.online.write();
        let replaced = online.remove(&user_id).is_some();
        for (other, sender) in online.iter() {
            if replaced {
                let _ = sender.send(RelayFrame::Disconnected(user_id.clone()));
            }
            let _ = sender.send(RelayFrame::Connected(user_id.clone()));
            let _ = tx.send(RelayFrame::Connected(other.clone()));
        }
        online.insert(user_id.clone(), tx);
        drop(online);

        if replaced {
            tracing::info!("Relay: {} reconnected, old connection dropped", user_id);
        } else {
            tracing::info!("Relay: {} connected", user_id);
        }

        (
            RelayEndpoint {
                user_id: user_id.clone(),
                relay: self.clone(),
            },
            RelayInbox { user_id, rx },
        )
    }

    /// Disconnect `user_id` and tell everyone else
    pub fn unregister(&self, user_id: &str) {
        let mut online = self.online.write();
        if online.remove(user_id).is_none() {
            return;
        }
        for sender in online.values() {
            let _ = sender.send(RelayFrame::Disconnected(user_id.to_string()));
        }
        drop(online);

        tracing::info!("Relay: {} disconnected", user_id);
    }

    /// Whether `user_id` is currently connected
    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.read().contains_key(user_id)
    }

    /// Ids of everyone connected, sorted
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.read().keys().cloned().collect();
        users.sort();
        users
    }

    /// Forward an opaque frame from `from` to `to`
    ///
    /// If `to` is offline the sender receives a `PeerUnreachable` notice
    /// instead. Fails only if `from` itself is not connected.
    pub fn forward(&self, from: &str, to: &str, data: String) -> Result<()> {
        let online = self.online.read();
        let sender = online.get(from).ok_or(Error::TransportClosed)?;

        let delivered = online
            .get(to)
            .map(|recipient| {
                recipient
                    .send(RelayFrame::Payload {
                        from: from.to_string(),
                        data,
                    })
                    .is_ok()
            })
            .unwrap_or(false);

        if !delivered {
            tracing::debug!("Relay: {} is not reachable, notifying {}", to, from);
            let _ = sender.send(RelayFrame::Unreachable(to.to_string()));
        }
        Ok(())
    }

    fn forward_payload(&self, from: &str, to: &str, payload: &WirePayload) -> Result<()> {
        self.forward(from, to, payload.to_json()?)
    }
}

/// A user's outbound connection to the relay
#[derive(Clone)]
pub struct RelayEndpoint {
    user_id: String,
    relay: MemoryRelay,
}

impl RelayEndpoint {
    /// The id this endpoint sends as
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[async_trait]
impl Transport for RelayEndpoint {
    async fn send_key_exchange(&self, to: &str, message: KeyExchangeMessage) -> Result<()> {
        self.relay
            .forward_payload(&self.user_id, to, &WirePayload::KeyExchange(message))
    }

    async fn send_envelope(&self, to: &str, envelope: MessageEnvelope) -> Result<()> {
        self.relay
            .forward_payload(&self.user_id, to, &WirePayload::Envelope(envelope))
    }
}

/// A user's inbound queue
pub struct RelayInbox {
    user_id: String,
    rx: mpsc::UnboundedReceiver<RelayFrame>,
}

impl RelayInbox {
    /// The id this inbox receives for
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Wait for the next event; `None` once the connection is closed
    ///
    /// A frame that fails to decode yields `Err(InvalidEnvelope)`; the inbox
    /// stays usable.
    pub async fn recv(&mut self) -> Option<Result<InboundEvent>> {
        self.rx.recv().await.map(decode_frame)
    }

    /// Take the next event if one is queued
    pub fn try_recv(&mut self) -> Option<Result<InboundEvent>> {
        self.rx.try_recv().ok().map(decode_frame)
    }
}

fn decode_frame(frame: RelayFrame) -> Result<InboundEvent> {
    Ok(match frame {
        RelayFrame::Payload { from, data } => match WirePayload::from_json(&data)? {
            WirePayload::KeyExchange(message) => InboundEvent::KeyExchangeReceived { from, message },
            WirePayload::Envelope(envelope) => InboundEvent::EnvelopeReceived { from, envelope },
        },
        RelayFrame::Connected(peer) => InboundEvent::PeerConnected(peer),
        RelayFrame::Disconnected(peer) => InboundEvent::PeerDisconnected(peer),
        RelayFrame::Unreachable(peer) => InboundEvent::PeerUnreachable(peer),
    })
}

// ============================================================================
// TESTS
// ============================================================================

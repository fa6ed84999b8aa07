//! # Session Orchestrator
//!
//! Ties the local identity, the channel table and a transport together for
//! one logged-in user.
//!
//! ## Exchange Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      KEY EXCHANGE + FIRST MESSAGE                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Alice                          Relay                         Bob      │
//! │     │                              │                             │      │
//! │     │ select_peer("bob")           │                             │      │
//! │     │ NoKey → ExchangeInitiated    │                             │      │
//! │     │── KeyExchange(Request, A) ──►│── KeyExchange(Request, A) ─►│      │
//! │     │                              │      derive, NoKey → Established │
//! │     │◄─ KeyExchange(Response, B) ──│◄─ KeyExchange(Response, B) ─│      │
//! │     │ derive                       │                             │      │
//! │     │ ExchangeInitiated            │                             │      │
//! │     │   → Established              │                             │      │
//! │     │                              │                             │      │
//! │     │ send_message("bob", "hi")    │                             │      │
//! │     │── Envelope ─────────────────►│── Envelope ────────────────►│      │
//! │     │                              │   verify, decrypt, log "hi" │      │
//! │                                                                         │
//! │  Only a Request is answered, so the exchange always terminates.         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sending Policy
//!
//! Sending before the channel is established fails with `ChannelNotReady`;
//! nothing is queued. Until the channel is established, every `select_peer`
//! or send offers our key again, so a request lost to an offline peer is
//! retried by the next attempt. A peer coming online also gets the offer
//! again if an exchange with it is pending.
//!
//! ## Peer Restarts
//!
//! A `Request` carrying a key different from the one in use means the peer
//! restarted with a new identity: the old keys are wiped and the channel is
//! re-keyed. A `Response` with a different key is never solicited and is
//! rejected.
//!
//! ## Concurrency
//!
//! All methods take `&self`. Work on one peer is serialized by that peer's
//! channel lock, which is held across the transport call so envelopes to a
//! peer leave in the order they were encrypted. Different peers do not block
//! each other. After [`SessionOrchestrator::logout`] every operation fails
//! with `SessionClosed`.

mod log;

pub use log::{ConversationEntry, ConversationLog, Direction};

use std::sync::Arc;

use parking_lot::RwLock;

use crate::channel::{ChannelState, ChannelStatus, ChannelTable, EstablishOutcome};
use crate::config::SessionConfig;
use crate::crypto::{derive_channel_keys, ChannelKeys, CryptoProvider, LocalIdentity, PublicKeyBytes};
use crate::envelope::{ExchangeKind, KeyExchangeMessage, MessageEnvelope, PROTOCOL_VERSION};
use crate::error::{Error, Result};
use crate::transport::{InboundEvent, Transport};

/// What happened as a result of an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A secure channel is ready
    ChannelEstablished {
        /// The peer on the other end
        peer: String,
    },

    /// A message was verified and decrypted
    MessageReceived(ConversationEntry),

    /// A peer came online
    PeerConnected(String),

    /// A peer went offline and its channel was reset
    PeerDisconnected(String),

    /// Something sent to this peer was not delivered
    PeerUnreachable(String),
}

/// One logged-in user's secure messaging session
pub struct SessionOrchestrator {
    local_id: String,
    public: PublicKeyBytes,
    /// `None` once logged out
    identity: RwLock<Option<LocalIdentity>>,
    transport: Arc<dyn Transport>,
    provider: Arc<dyn CryptoProvider>,
    config: SessionConfig,
    channels: ChannelTable,
    active_recipient: RwLock<Option<String>>,
    log: ConversationLog,
}

impl SessionOrchestrator {
    /// Start a session for the already-authenticated `local_id`
    ///
    /// Generates a fresh key pair; it lives until [`Self::logout`].
    pub fn new(
        local_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        provider: Arc<dyn CryptoProvider>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let identity = LocalIdentity::generate(local_id, provider.as_ref())?;

        tracing::info!(
            "Session started for {} (crypto provider: {})",
            identity.id(),
            provider.name()
        );

        Ok(Self {
            local_id: identity.id().to_string(),
            public: identity.export_public(),
            identity: RwLock::new(Some(identity)),
            transport,
            provider,
            channels: ChannelTable::new(config.replay_window),
            config,
            active_recipient: RwLock::new(None),
            log: ConversationLog::new(),
        })
    }

    /// The local user id
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The public key peers see for this session
    pub fn public_key(&self) -> PublicKeyBytes {
        self.public
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether [`Self::logout`] has run
    pub fn is_closed(&self) -> bool {
        self.identity.read().is_none()
    }

    /// Currently selected recipient, if any
    pub fn active_recipient(&self) -> Option<String> {
        self.active_recipient.read().clone()
    }

    /// Channel status with `peer`
    pub async fn channel_status(&self, peer: &str) -> ChannelStatus {
        self.channels.status(peer).await
    }

    /// Peers with an established channel
    pub async fn established_peers(&self) -> Vec<String> {
        self.channels.established_peers().await
    }

    /// Make `peer` the active recipient and offer our key unless the
    /// channel is already established
    pub async fn select_peer(&self, peer: &str) -> Result<ChannelStatus> {
        self.ensure_open()?;
        *self.active_recipient.write() = Some(peer.to_string());

        let handle = self.channels.entry(peer);
        let mut channel = handle.lock().await;
        self.initiate(peer, &mut channel).await?;

        tracing::debug!("Active recipient is now {} ({})", peer, channel.status().as_str());
        Ok(channel.status())
    }

    /// Encrypt `text` and send it to `peer`
    pub async fn send_message(&self, peer: &str, text: &str) -> Result<ConversationEntry> {
        self.ensure_open()?;
        if text.len() > self.config.max_message_size {
            return Err(Error::MessageTooLarge {
                size: text.len(),
                max: self.config.max_message_size,
            });
        }

        let handle = self.channels.entry(peer);
        let mut channel = handle.lock().await;

        if !channel.is_established() {
            self.initiate(peer, &mut channel).await?;
            return Err(Error::ChannelNotReady(peer.to_string()));
        }

        let envelope = channel.encrypt(&self.local_id, text.as_bytes(), self.provider.as_ref())?;
        if self.config.verbose_logging {
            tracing::debug!(
                "Sending {} byte envelope to {}",
                envelope.ciphertext().len(),
                peer
            );
        }
        self.transport.send_envelope(peer, envelope).await?;
        drop(channel);

        let entry = ConversationEntry::new(peer, Direction::Sent, text);
        self.record(&entry);
        Ok(entry)
    }

    /// Send `text` to the active recipient
    pub async fn send_to_active(&self, text: &str) -> Result<ConversationEntry> {
        let peer = self.active_recipient().ok_or(Error::NoActiveRecipient)?;
        self.send_message(&peer, text).await
    }

    /// Process one event from the transport
    ///
    /// Any reply is sent before this returns. `Ok(None)` means the event was
    /// handled and needs no attention (for example a duplicate key offer).
    pub async fn handle_event(&self, event: InboundEvent) -> Result<Option<SessionEvent>> {
        self.ensure_open()?;
        match event {
            InboundEvent::KeyExchangeReceived { from, message } => {
                self.on_key_exchange(from, message).await
            }
            InboundEvent::EnvelopeReceived { from, envelope } => {
                self.on_envelope(from, envelope).await
            }
            InboundEvent::PeerConnected(peer) => {
                tracing::debug!("{} is online", peer);
                self.reoffer(&peer).await;
                Ok(Some(SessionEvent::PeerConnected(peer)))
            }
            InboundEvent::PeerDisconnected(peer) => {
                self.channels.reset(&peer).await;
                tracing::info!("{} went offline, channel reset", peer);
                Ok(Some(SessionEvent::PeerDisconnected(peer)))
            }
            InboundEvent::PeerUnreachable(peer) => {
                tracing::warn!("{} could not be reached", peer);
                Ok(Some(SessionEvent::PeerUnreachable(peer)))
            }
        }
    }

    /// Conversation with `peer`, oldest first
    pub fn messages_for(&self, peer: &str) -> Vec<ConversationEntry> {
        self.log.for_peer(peer)
    }

    /// Drop the channel with `peer` back to `NoKey`
    ///
    /// Used after an application-level timeout; the next `select_peer` or
    /// send starts a fresh exchange.
    pub async fn reset_peer(&self, peer: &str) {
        self.channels.reset(peer).await;
    }

    /// End the session
    ///
    /// The identity is released first so nothing new can be derived, then
    /// every channel's keys are wiped and the conversation log and active
    /// recipient are cleared. Calling it again does nothing.
    pub async fn logout(&self) {
        let identity = match self.identity.write().take() {
            Some(identity) => identity,
            None => return,
        };

        self.channels.reset_all().await;
        self.log.clear();
        *self.active_recipient.write() = None;
        drop(identity);

        tracing::info!("{} logged out, session keys destroyed", self.local_id);
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn offer(&self, kind: ExchangeKind) -> KeyExchangeMessage {
        KeyExchangeMessage::new(self.local_id.as_str(), kind, self.public)
    }

    /// Derive keys for `peer` without holding the identity lock afterwards
    fn derive(&self, peer: &str, peer_public: &PublicKeyBytes) -> Result<ChannelKeys> {
        let guard = self.identity.read();
        let identity = guard.as_ref().ok_or(Error::SessionClosed)?;
        derive_channel_keys(identity, peer, peer_public)
    }

    /// Send our key as a `Request` unless the channel is established
    ///
    /// A failed first offer puts the channel back to `NoKey`; a failed
    /// repeat leaves the pending exchange as it was.
    async fn initiate(&self, peer: &str, channel: &mut ChannelState) -> Result<()> {
        if channel.is_established() {
            return Ok(());
        }
        let first = channel.begin_exchange();

        if let Err(e) = self
            .transport
            .send_key_exchange(peer, self.offer(ExchangeKind::Request))
            .await
        {
            if first {
                channel.reset();
            }
            return Err(e);
        }

        if first {
            tracing::info!("Key exchange initiated with {}", peer);
        } else {
            tracing::debug!("Key exchange with {} offered again", peer);
        }
        Ok(())
    }

    /// Offer our key again to a peer that just came online
    async fn reoffer(&self, peer: &str) {
        let handle = match self.channels.get(peer) {
            Some(handle) => handle,
            None => return,
        };
        let mut channel = handle.lock().await;
        if channel.status() != ChannelStatus::ExchangeInitiated {
            return;
        }
        if let Err(e) = self.initiate(peer, &mut channel).await {
            tracing::warn!("Could not offer key to {}: {}", peer, e);
        }
    }

    async fn on_key_exchange(
        &self,
        from: String,
        message: KeyExchangeMessage,
    ) -> Result<Option<SessionEvent>> {
        if message.version != PROTOCOL_VERSION {
            return Err(Error::UnsupportedVersion(message.version));
        }
        if message.sender_id != from {
            return Err(Error::SenderMismatch {
                transport: from,
                claimed: message.sender_id,
            });
        }

        // Bad keys are turned away before any channel exists for them
        let keys = self.derive(&from, &message.public_key).map_err(|e| {
            tracing::warn!("Rejected key from {}: {}", from, e);
            e
        })?;

        let handle = self.channels.entry(&from);
        let mut channel = handle.lock().await;
        // Logout may have drained the table while we derived
        self.ensure_open()?;

        let installed = match message.kind {
            ExchangeKind::Request => channel.rekey(&message.public_key, keys),
            ExchangeKind::Response => channel.establish(&message.public_key, keys),
        };
        let outcome = installed.map_err(|e| {
            tracing::warn!("Rejected key from {}: {}", from, e);
            e
        })?;

        if message.kind == ExchangeKind::Request {
            self.transport
                .send_key_exchange(&from, self.offer(ExchangeKind::Response))
                .await?;
            tracing::debug!("Answered key exchange request from {}", from);
        }
        drop(channel);

        Ok(match outcome {
            EstablishOutcome::Established | EstablishOutcome::Rekeyed => {
                Some(SessionEvent::ChannelEstablished { peer: from })
            }
            EstablishOutcome::AlreadyEstablished => {
                tracing::debug!("Duplicate key from {} ignored", from);
                None
            }
        })
    }

    async fn on_envelope(
        &self,
        from: String,
        envelope: MessageEnvelope,
    ) -> Result<Option<SessionEvent>> {
        if envelope.sender_id() != from {
            tracing::warn!(
                "Envelope from {} claims to be from {}",
                from,
                envelope.sender_id()
            );
            return Err(Error::SenderMismatch {
                transport: from,
                claimed: envelope.sender_id().to_string(),
            });
        }

        let handle = match self.channels.get(&from) {
            Some(handle) => handle,
            None => {
                tracing::warn!("Dropped envelope from {}: no channel", from);
                return Err(Error::UnknownSender(from));
            }
        };

        let plaintext = {
            let mut channel = handle.lock().await;
            channel.decrypt(&envelope).map_err(|e| {
                match &e {
                    Error::IntegrityCheckFailed => {
                        tracing::warn!("Envelope from {} failed the integrity check", from)
                    }
                    Error::DecryptionFailed => {
                        tracing::warn!("Envelope from {} passed integrity but failed AEAD", from)
                    }
                    Error::ReplayDetected(_) => {
                        tracing::warn!("Replayed envelope from {} discarded", from)
                    }
                    _ => tracing::debug!("Envelope from {} not accepted: {}", from, e),
                }
                e
            })?
        };

        if self.config.verbose_logging {
            tracing::debug!("Decrypted {} byte message from {}", plaintext.len(), from);
        }

        let text = String::from_utf8(plaintext)
            .map_err(|_| Error::InvalidEnvelope("message is not valid UTF-8".into()))?;

        let entry = ConversationEntry::new(from, Direction::Received, text);
        self.record(&entry);
        Ok(Some(SessionEvent::MessageReceived(entry)))
    }

    fn record(&self, entry: &ConversationEntry) {
        if self.config.keep_conversation_log {
            self.log.append(entry.clone());
        }
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("local_id", &self.local_id)
            .field("public_key", &self.public.fingerprint())
            .field("provider", &self.provider.name())
            .field("active_recipient", &self.active_recipient())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

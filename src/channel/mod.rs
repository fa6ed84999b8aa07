//! # Channel State Tracker
//!
//! One state machine per peer, deciding whether encryption may proceed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      CHANNEL STATE MACHINE                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                 begin_exchange()                                        │
//! │     ┌───────┐ ───────────────────► ┌───────────────────┐                │
//! │     │ NoKey │                      │ ExchangeInitiated │                │
//! │     └───────┘ ◄─────────────────── └───────────────────┘                │
//! │       │   ▲          reset()                 │                          │
//! │       │   │                                  │ establish(peer key)      │
//! │       │   │ reset()                          ▼                          │
//! │       │   │ (keys zeroized)        ┌───────────────────┐                │
//! │       │   └─────────────────────── │    Established    │ ◄──┐           │
//! │       │                            └───────────────────┘ ───┘ rekey      │
//! │       └──────── establish(peer key) ────────▲                           │
//! │                 (responder path)                                        │
//! │                                                                         │
//! │  encrypt / decrypt outside Established ──► ChannelNotReady              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! The [`ChannelTable`] map is guarded by a short-held `RwLock`; each entry
//! has its own async mutex. Everything touching one peer is serialized on
//! that mutex while other peers proceed in parallel. Key derivation finishes
//! before the new state is written, so nobody observes a half-made channel.

mod replay;

pub use replay::ReplayGuard;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::Zeroize;

use crate::crypto::{
    codec, derive_channel_keys, ChannelKeys, CryptoProvider, LocalIdentity, PublicKeyBytes,
};
use crate::envelope::MessageEnvelope;
use crate::error::{Error, Result};

/// Where a channel is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelStatus {
    /// No key material
    NoKey,
    /// We sent our public key and are waiting for theirs
    ExchangeInitiated,
    /// Keys derived; messages may flow
    Established,
}

impl ChannelStatus {
    /// Convert to a short string for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoKey => "no_key",
            Self::ExchangeInitiated => "exchange_initiated",
            Self::Established => "established",
        }
    }
}

/// Result of feeding a peer's public key into a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishOutcome {
    /// Keys were installed and the channel moved to `Established`
    Established,
    /// The same key arrived again; existing keys are kept
    AlreadyEstablished,
    /// The peer restarted with a new key; old keys were wiped and replaced
    Rekeyed,
}

/// The secure channel with one peer
///
/// Invariant: `keys.is_some()` exactly when `status == Established`.
pub struct ChannelState {
    peer_id: String,
    status: ChannelStatus,
    keys: Option<ChannelKeys>,
    peer_public: Option<PublicKeyBytes>,
    replay: ReplayGuard,
}

impl ChannelState {
    /// A fresh channel in `NoKey`
    pub fn new(peer_id: impl Into<String>, replay_window: usize) -> Self {
        Self {
            peer_id: peer_id.into(),
            status: ChannelStatus::NoKey,
            keys: None,
            peer_public: None,
            replay: ReplayGuard::with_capacity(replay_window),
        }
    }

    /// Peer this channel belongs to
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Current status
    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    /// Whether encryption may proceed
    pub fn is_established(&self) -> bool {
        self.status == ChannelStatus::Established
    }

    /// The peer key the current keys were derived from
    pub fn peer_public(&self) -> Option<&PublicKeyBytes> {
        self.peer_public.as_ref()
    }

    /// Mark that we sent our public key
    ///
    /// Returns `true` if the state changed; an exchange already in flight or
    /// an established channel is left alone.
    pub fn begin_exchange(&mut self) -> bool {
        if self.status == ChannelStatus::NoKey {
            self.status = ChannelStatus::ExchangeInitiated;
            true
        } else {
            false
        }
    }

    /// Install keys derived from `peer_public` and move to `Established`
    ///
    /// Idempotent for a repeated key. A different key while established is
    /// rejected and the current keys stay in place, so one session never
    /// holds two key sets for the same peer.
    pub fn establish(
        &mut self,
        peer_public: &PublicKeyBytes,
        keys: ChannelKeys,
    ) -> Result<EstablishOutcome> {
        if self.is_established() {
            return if self.peer_public.as_ref() == Some(peer_public) {
                Ok(EstablishOutcome::AlreadyEstablished)
            } else {
                Err(Error::InvalidPeerKey(format!(
                    "{} sent key {} but the channel is established with {}",
                    self.peer_id,
                    peer_public.fingerprint(),
                    self.peer_public
                        .as_ref()
                        .map(|k| k.fingerprint())
                        .unwrap_or_default()
                )))
            };
        }

        self.install(peer_public, keys);
        tracing::info!(
            "Secure channel established with {} (peer key {})",
            self.peer_id,
            peer_public.fingerprint()
        );
        Ok(EstablishOutcome::Established)
    }

    /// Like [`Self::establish`], but a different key replaces the current one
    ///
    /// Used for a fresh request from the peer: a request carrying a new key
    /// means the peer restarted with a new identity.
    pub fn rekey(
        &mut self,
        peer_public: &PublicKeyBytes,
        keys: ChannelKeys,
    ) -> Result<EstablishOutcome> {
        if !self.is_established() || self.peer_public.as_ref() == Some(peer_public) {
            return self.establish(peer_public, keys);
        }

        let previous = self
            .peer_public
            .as_ref()
            .map(|k| k.fingerprint())
            .unwrap_or_default();
        self.reset();
        self.install(peer_public, keys);

        tracing::info!(
            "Secure channel with {} re-keyed ({} -> {})",
            self.peer_id,
            previous,
            peer_public.fingerprint()
        );
        Ok(EstablishOutcome::Rekeyed)
    }

    fn install(&mut self, peer_public: &PublicKeyBytes, keys: ChannelKeys) {
        self.keys = Some(keys);
        self.peer_public = Some(*peer_public);
        self.replay.clear();
        self.status = ChannelStatus::Established;
    }

    /// Encrypt a message from `sender_id` to this peer
    pub fn encrypt(
        &self,
        sender_id: &str,
        plaintext: &[u8],
        provider: &dyn CryptoProvider,
    ) -> Result<MessageEnvelope> {
        let keys = self.ready_keys()?;
        codec::encrypt(keys, sender_id, plaintext, provider)
    }

    /// Verify, decrypt and replay-check an envelope from this peer
    pub fn decrypt(&mut self, envelope: &MessageEnvelope) -> Result<Vec<u8>> {
        let keys = self.ready_keys()?;
        let plaintext = codec::decrypt(keys, envelope)?;

        if !self.replay.check_and_record(envelope.nonce()) {
            return Err(Error::ReplayDetected(self.peer_id.clone()));
        }
        Ok(plaintext)
    }

    /// Drop back to `NoKey`, wiping key material
    pub fn reset(&mut self) {
        if let Some(mut keys) = self.keys.take() {
            keys.zeroize();
        }
        self.peer_public = None;
        self.replay.clear();
        if self.status != ChannelStatus::NoKey {
            tracing::debug!(
                "Channel with {} reset from {}",
                self.peer_id,
                self.status.as_str()
            );
        }
        self.status = ChannelStatus::NoKey;
    }

    fn ready_keys(&self) -> Result<&ChannelKeys> {
        match (&self.status, &self.keys) {
            (ChannelStatus::Established, Some(keys)) => Ok(keys),
            _ => Err(Error::ChannelNotReady(self.peer_id.clone())),
        }
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> Option<&ChannelKeys> {
        self.keys.as_ref()
    }
}

impl std::fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelState")
            .field("peer_id", &self.peer_id)
            .field("status", &self.status)
            .field("peer_public", &self.peer_public)
            .finish_non_exhaustive()
    }
}

impl Drop for ChannelState {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Shared handle to one peer's channel
pub type ChannelHandle = Arc<Mutex<ChannelState>>;

/// All channels of one local identity, keyed by peer id
pub struct ChannelTable {
    channels: RwLock<HashMap<String, ChannelHandle>>,
    replay_window: usize,
}

impl ChannelTable {
    /// Create an empty table
    pub fn new(replay_window: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            replay_window,
        }
    }

    /// Get the channel for `peer_id`, creating it in `NoKey` if missing
    pub fn entry(&self, peer_id: &str) -> ChannelHandle {
        if let Some(handle) = self.channels.read().get(peer_id) {
            return handle.clone();
        }

        self.channels
            .write()
            .entry(peer_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChannelState::new(peer_id, self.replay_window))))
            .clone()
    }

    /// Get the channel for `peer_id` without creating one
    pub fn get(&self, peer_id: &str) -> Option<ChannelHandle> {
        self.channels.read().get(peer_id).cloned()
    }

    /// Current status; peers we never talked to are `NoKey`
    pub async fn status(&self, peer_id: &str) -> ChannelStatus {
        match self.get(peer_id) {
            Some(handle) => handle.lock().await.status(),
            None => ChannelStatus::NoKey,
        }
    }

    /// Mark that our key went out to `peer_id`; `false` if nothing changed
    pub async fn begin_exchange(&self, peer_id: &str) -> bool {
        self.entry(peer_id).lock().await.begin_exchange()
    }

    /// Derive keys for `peer_id` from its public key and install them
    ///
    /// Derivation runs first; a rejected key creates no entry.
    pub async fn establish(
        &self,
        local: &LocalIdentity,
        peer_id: &str,
        peer_public: &PublicKeyBytes,
    ) -> Result<EstablishOutcome> {
        let keys = derive_channel_keys(local, peer_id, peer_public)?;
        self.entry(peer_id).lock().await.establish(peer_public, keys)
    }

    /// Reset one peer's channel to `NoKey`
    pub async fn reset(&self, peer_id: &str) {
        if let Some(handle) = self.get(peer_id) {
            handle.lock().await.reset();
        }
    }

    /// Wipe every channel and forget all peers
    pub async fn reset_all(&self) {
        let handles: Vec<ChannelHandle> = self
            .channels
            .write()
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        for handle in handles {
            handle.lock().await.reset();
        }
    }

    /// Peers whose channel is established
    pub async fn established_peers(&self) -> Vec<String> {
        let handles: Vec<ChannelHandle> = self.channels.read().values().cloned().collect();

        let mut peers = Vec::new();
        for handle in handles {
            let state = handle.lock().await;
            if state.is_established() {
                peers.push(state.peer_id().to_string());
            }
        }
        peers.sort();
        peers
    }

    /// Number of peers with a channel entry
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether no peer has a channel entry
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::OsCryptoProvider;

    fn identity(id: &str) -> LocalIdentity {
        LocalIdentity::generate(id, &OsCryptoProvider).unwrap()
    }

    /// Derive `local`'s keys for `peer` and feed them to `channel`
    fn accept(
        channel: &mut ChannelState,
        local: &LocalIdentity,
        peer: &PublicKeyBytes,
    ) -> Result<EstablishOutcome> {
        let keys = derive_channel_keys(local, channel.peer_id(), peer)?;
        channel.establish(peer, keys)
    }

    #[test]
    fn test_not_ready_before_established() {
        let mut channel = ChannelState::new("bob", 16);
        assert!(matches!(
            channel.encrypt("alice", b"hi", &OsCryptoProvider),
            Err(Error::ChannelNotReady(_))
        ));

        channel.begin_exchange();
        assert_eq!(channel.status(), ChannelStatus::ExchangeInitiated);
        assert!(matches!(
            channel.encrypt("alice", b"hi", &OsCryptoProvider),
            Err(Error::ChannelNotReady(_))
        ));
    }

    #[test]
    fn test_initiator_path() {
        let alice = identity("alice");
        let bob = identity("bob");

        let mut at_alice = ChannelState::new("bob", 16);
        assert!(at_alice.begin_exchange());
        assert!(!at_alice.begin_exchange());

        let outcome = accept(&mut at_alice, &alice, &bob.export_public()).unwrap();
        assert_eq!(outcome, EstablishOutcome::Established);
        assert!(at_alice.is_established());
        assert!(at_alice.keys().is_some());
    }

    #[test]
    fn test_responder_path_and_round_trip() {
        let alice = identity("alice");
        let bob = identity("bob");

        let mut at_alice = ChannelState::new("bob", 16);
        let mut at_bob = ChannelState::new("alice", 16);

        // Bob receives Alice's key first: NoKey → Established directly
        accept(&mut at_bob, &bob, &alice.export_public()).unwrap();
        accept(&mut at_alice, &alice, &bob.export_public()).unwrap();

        let env = at_alice.encrypt("alice", b"hi", &OsCryptoProvider).unwrap();
        assert_eq!(at_bob.decrypt(&env).unwrap(), b"hi");
    }

    #[test]
    fn test_duplicate_key_is_idempotent() {
        let alice = identity("alice");
        let bob = identity("bob");

        let mut channel = ChannelState::new("bob", 16);
        accept(&mut channel, &alice, &bob.export_public()).unwrap();
        let before = channel.keys().cloned().unwrap();

        let outcome = accept(&mut channel, &alice, &bob.export_public()).unwrap();
        assert_eq!(outcome, EstablishOutcome::AlreadyEstablished);
        assert!(channel.keys().unwrap() == &before);

        // A repeated request with the same key is not a re-key either
        let keys = derive_channel_keys(&alice, "bob", &bob.export_public()).unwrap();
        let outcome = channel.rekey(&bob.export_public(), keys).unwrap();
        assert_eq!(outcome, EstablishOutcome::AlreadyEstablished);
    }

    #[test]
    fn test_conflicting_key_rejected_and_keys_kept() {
        let alice = identity("alice");
        let bob = identity("bob");
        let impostor = identity("bob");

        let mut channel = ChannelState::new("bob", 16);
        accept(&mut channel, &alice, &bob.export_public()).unwrap();
        let before = channel.keys().cloned().unwrap();

        let err = accept(&mut channel, &alice, &impostor.export_public()).unwrap_err();
        assert!(matches!(err, Error::InvalidPeerKey(_)));
        assert!(channel.is_established());
        assert!(channel.keys().unwrap() == &before);
    }

    #[test]
    fn test_rekey_replaces_keys_and_replay_memory() {
        let alice = identity("alice");
        let old_bob = identity("bob");
        let new_bob = identity("bob");

        let mut at_alice = ChannelState::new("bob", 16);
        let mut at_old_bob = ChannelState::new("alice", 16);
        accept(&mut at_alice, &alice, &old_bob.export_public()).unwrap();
        accept(&mut at_old_bob, &old_bob, &alice.export_public()).unwrap();
        let stale = at_old_bob.encrypt("bob", b"old", &OsCryptoProvider).unwrap();
        let before = at_alice.keys().cloned().unwrap();

        let keys = derive_channel_keys(&alice, "bob", &new_bob.export_public()).unwrap();
        let outcome = at_alice.rekey(&new_bob.export_public(), keys).unwrap();
        assert_eq!(outcome, EstablishOutcome::Rekeyed);
        assert_eq!(at_alice.peer_public(), Some(&new_bob.export_public()));
        assert!(at_alice.keys().unwrap() != &before);

        // Envelopes under the old keys no longer verify
        assert!(matches!(
            at_alice.decrypt(&stale),
            Err(Error::IntegrityCheckFailed)
        ));

        let mut at_new_bob = ChannelState::new("alice", 16);
        accept(&mut at_new_bob, &new_bob, &alice.export_public()).unwrap();
        let env = at_new_bob.encrypt("bob", b"new", &OsCryptoProvider).unwrap();
        assert_eq!(at_alice.decrypt(&env).unwrap(), b"new");
    }

    #[test]
    fn test_rekey_on_fresh_channel_establishes() {
        let alice = identity("alice");
        let bob = identity("bob");

        let mut channel = ChannelState::new("bob", 16);
        let keys = derive_channel_keys(&alice, "bob", &bob.export_public()).unwrap();
        assert_eq!(
            channel.rekey(&bob.export_public(), keys).unwrap(),
            EstablishOutcome::Established
        );
    }

    #[test]
    fn test_reset_wipes_keys() {
        let alice = identity("alice");
        let bob = identity("bob");

        let mut channel = ChannelState::new("bob", 16);
        accept(&mut channel, &alice, &bob.export_public()).unwrap();
        channel.reset();

        assert_eq!(channel.status(), ChannelStatus::NoKey);
        assert!(channel.keys().is_none());
        assert!(channel.peer_public().is_none());
        assert!(matches!(
            channel.encrypt("alice", b"hi", &OsCryptoProvider),
            Err(Error::ChannelNotReady(_))
        ));
    }

    #[test]
    fn test_replayed_envelope_rejected() {
        let alice = identity("alice");
        let bob = identity("bob");

        let mut at_alice = ChannelState::new("bob", 16);
        let mut at_bob = ChannelState::new("alice", 16);
        accept(&mut at_alice, &alice, &bob.export_public()).unwrap();
        accept(&mut at_bob, &bob, &alice.export_public()).unwrap();

        let env = at_alice.encrypt("alice", b"once", &OsCryptoProvider).unwrap();
        assert!(at_bob.decrypt(&env).is_ok());
        assert!(matches!(at_bob.decrypt(&env), Err(Error::ReplayDetected(_))));
    }

    #[tokio::test]
    async fn test_table_lazily_creates_entries() {
        let table = ChannelTable::new(16);
        assert!(table.is_empty());
        assert_eq!(table.status("bob").await, ChannelStatus::NoKey);
        assert!(table.get("bob").is_none());

        assert!(table.begin_exchange("bob").await);
        assert_eq!(table.status("bob").await, ChannelStatus::ExchangeInitiated);

        // Same entry comes back
        let handle = table.entry("bob");
        assert!(Arc::ptr_eq(&handle, &table.entry("bob")));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_table_rejected_key_creates_no_entry() {
        let alice = identity("alice");

        let table = ChannelTable::new(16);
        let low_order = PublicKeyBytes([0u8; 32]);
        assert!(matches!(
            table.establish(&alice, "mallory", &low_order).await,
            Err(Error::InvalidPeerKey(_))
        ));
        assert!(table.get("mallory").is_none());

        // Reflected key
        assert!(table
            .establish(&alice, "mallory", &alice.export_public())
            .await
            .is_err());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_table_reset_all() {
        let alice = identity("alice");
        let bob = identity("bob");
        let carol = identity("carol");

        let table = ChannelTable::new(16);
        table
            .establish(&alice, "bob", &bob.export_public())
            .await
            .unwrap();
        table
            .establish(&alice, "carol", &carol.export_public())
            .await
            .unwrap();

        let bob_handle = table.get("bob").unwrap();
        assert_eq!(table.established_peers().await, vec!["bob", "carol"]);

        table.reset_all().await;
        assert!(table.is_empty());
        // Outstanding handles see wiped state too
        assert!(bob_handle.lock().await.keys().is_none());
    }
}

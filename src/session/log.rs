//! Conversation log.
//!
//! Plaintext of what was sent and received, per peer, for display. Lives
//! only in memory and is cleared on logout.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::now_timestamp_millis;

/// Which way a message went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// We sent it
    Sent,
    /// The peer sent it
    Received,
}

impl Direction {
    /// Convert to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }
}

/// One displayed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Local identifier
    pub id: Uuid,
    /// The other party
    pub peer: String,
    /// Sent or received
    pub direction: Direction,
    /// Decrypted text
    pub text: String,
    /// When it was sent or received (Unix ms, local clock)
    pub timestamp_ms: i64,
}

impl ConversationEntry {
    /// Build an entry stamped with the current time
    pub fn new(peer: impl Into<String>, direction: Direction, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            direction,
            text: text.into(),
            timestamp_ms: now_timestamp_millis(),
        }
    }
}

/// Append-only per-peer message history
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: RwLock<HashMap<String, Vec<ConversationEntry>>>,
}

impl ConversationLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to its peer's history
    pub fn append(&self, entry: ConversationEntry) {
        self.entries
            .write()
            .entry(entry.peer.clone())
            .or_default()
            .push(entry);
    }

    /// History with `peer`, oldest first
    pub fn for_peer(&self, peer: &str) -> Vec<ConversationEntry> {
        self.entries.read().get(peer).cloned().unwrap_or_default()
    }

    /// Peers with at least one entry, sorted
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.entries.read().keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Forget everything
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_kept_per_peer_in_order() {
        let log = ConversationLog::new();
        log.append(ConversationEntry::new("bob", Direction::Sent, "hi"));
        log.append(ConversationEntry::new("carol", Direction::Sent, "hey"));
        log.append(ConversationEntry::new("bob", Direction::Received, "hello"));

        let bob = log.for_peer("bob");
        assert_eq!(bob.len(), 2);
        assert_eq!(bob[0].text, "hi");
        assert_eq!(bob[1].direction, Direction::Received);
        assert_ne!(bob[0].id, bob[1].id);

        assert_eq!(log.peers(), vec!["bob", "carol"]);
        assert!(log.for_peer("dave").is_empty());
    }

    #[test]
    fn test_clear() {
        let log = ConversationLog::new();
        log.append(ConversationEntry::new("bob", Direction::Sent, "hi"));
        log.clear();
        assert!(log.peers().is_empty());
    }

    #[test]
    fn test_entry_serializes_direction_as_snake_case() {
        let entry = ConversationEntry::new("bob", Direction::Received, "hi");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["direction"], "received");
        assert_eq!(json["peer"], "bob");
    }
}

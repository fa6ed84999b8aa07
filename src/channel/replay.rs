//! Replay protection for envelopes.
//!
//! Nonces are random, not sequential, so a sliding bitmap does not apply.
//! Instead each channel remembers the last `capacity` nonces it accepted and
//! rejects a repeat. The transport is at-least-once, so duplicates are
//! expected in normal operation.
//!
//! Only nonces of envelopes that passed authentication are recorded; a
//! forged envelope cannot evict real entries.
//!
//! Not thread-safe on its own; it lives inside a locked `ChannelState`.

use std::collections::{HashSet, VecDeque};

use crate::crypto::NONCE_SIZE;

/// Bounded memory of accepted nonces
#[derive(Debug, Clone)]
pub struct ReplayGuard {
    capacity: usize,
    order: VecDeque<[u8; NONCE_SIZE]>,
    seen: HashSet<[u8; NONCE_SIZE]>,
}

impl ReplayGuard {
    /// Default number of nonces remembered per channel
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a guard remembering up to `capacity` nonces
    ///
    /// A capacity of 0 disables replay detection.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            seen: HashSet::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
        }
    }

    /// Record `nonce`; returns `false` if it was already seen
    pub fn check_and_record(&mut self, nonce: &[u8; NONCE_SIZE]) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if !self.seen.insert(*nonce) {
            return false;
        }
        self.order.push_back(*nonce);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Forget everything (used when the channel is reset)
    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    /// Number of nonces currently remembered
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

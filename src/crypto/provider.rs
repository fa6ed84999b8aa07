//! # Crypto Provider
//!
//! The source of randomness is an injected capability rather than an ambient
//! global. Key generation and nonce generation both go through a
//! [`CryptoProvider`], so tests can swap in a seeded generator and get
//! reproducible key pairs and nonces.
//!
//! ```text
//! ┌───────────────────────┐        ┌──────────────────────────┐
//! │   LocalIdentity       │──uses─►│                          │
//! │   ::generate()        │        │   dyn CryptoProvider     │
//! └───────────────────────┘        │                          │
//! ┌───────────────────────┐        │  OsCryptoProvider        │
//! │   codec::encrypt()    │──uses─►│  SeededCryptoProvider    │
//! │   (nonce)             │        │                          │
//! └───────────────────────┘        └──────────────────────────┘
//! ```

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::SeedableRng;
use rand_core::RngCore;

use crate::error::{Error, Result};

/// Capability for drawing cryptographically secure random bytes
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with random bytes
    ///
    /// Fails with `CryptoUnavailable` when the platform cannot supply
    /// randomness.
    fn fill_random(&self, dest: &mut [u8]) -> Result<()>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Provider backed by the operating system's CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCryptoProvider;

impl CryptoProvider for OsCryptoProvider {
    fn fill_random(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::CryptoUnavailable(format!("OS random source failed: {}", e)))
    }

    fn name(&self) -> &'static str {
        "os"
    }
}

/// Deterministic provider for tests and reproducible vectors
///
/// Never use this outside tests: anyone who knows the seed knows every key.
pub struct SeededCryptoProvider {
    rng: Mutex<StdRng>,
}

impl SeededCryptoProvider {
    /// Create a provider whose output is fully determined by `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl CryptoProvider for SeededCryptoProvider {
    fn fill_random(&self, dest: &mut [u8]) -> Result<()> {
        self.rng.lock().fill_bytes(dest);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "seeded"
    }
}

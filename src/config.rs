//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::channel::ReplayGuard;
use crate::error::{Error, Result};

/// Default largest plaintext accepted for sending (64 KiB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Hard ceiling for `max_message_size` (16 MiB).
const MAX_MESSAGE_SIZE_CEILING: usize = 16 * 1024 * 1024;

/// Configuration for a [`crate::SessionOrchestrator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Largest plaintext, in bytes, that may be sent
    pub max_message_size: usize,
    /// Accepted nonces remembered per peer for replay detection (0 disables)
    pub replay_window: usize,
    /// Keep sent and received plaintext for display
    pub keep_conversation_log: bool,
    /// Log every envelope at debug level
    pub verbose_logging: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            replay_window: ReplayGuard::DEFAULT_CAPACITY,
            keep_conversation_log: true,
            verbose_logging: false,
        }
    }
}

impl SessionConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that values are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_message_size == 0 {
            return Err(Error::InvalidConfig(
                "max_message_size must be greater than zero".into(),
            ));
        }
        if self.max_message_size > MAX_MESSAGE_SIZE_CEILING {
            return Err(Error::InvalidConfig(format!(
                "max_message_size {} exceeds {}",
                self.max_message_size, MAX_MESSAGE_SIZE_CEILING
            )));
        }
        Ok(())
    }
}

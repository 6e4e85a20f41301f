//! Engine configuration.
//!
//! Host applications embed the engine and hand it a TOML fragment from
//! their own config file; every setting has a default so an empty string
//! is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::attachment::DEFAULT_SIGNATURE_MARKER;
use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Notification queue configuration
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Reconciliation behavior
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Signed attachment reference handling
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

impl EngineConfig {
    /// Parse a TOML fragment, applying defaults for absent keys.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.channel.capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Queue sizing for the subscription driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Bounded capacity of the driver's command queue
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    256
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Reconciliation behavior toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Surface children of out-of-scope parents as top-level items
    #[serde(default = "default_promote_orphans")]
    pub promote_orphans: bool,
}

fn default_promote_orphans() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            promote_orphans: default_promote_orphans(),
        }
    }
}

/// Signed attachment reference handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Marker introducing the rotating signature segment of a reference
    #[serde(default = "default_signature_marker")]
    pub signature_marker: String,
}

fn default_signature_marker() -> String {
    DEFAULT_SIGNATURE_MARKER.to_string()
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            signature_marker: default_signature_marker(),
        }
    }
}

use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Default UDP port used by VMC protocol performers.
pub const DEFAULT_VMC_PORT: u16 = 39539;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Enables or disables verbose receiver logging for the whole process.
pub fn set_debug_enabled(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Returns whether verbose receiver logging is enabled. Read on every
/// handled message, so toggling takes effect immediately.
pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Top-level configuration for a receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Local address the listener binds to.
    pub bind_name: String,
    pub port: u16,
    /// Publish after every mutating message instead of waiting for a
    /// boundary marker.
    pub force_update: bool,
    pub debug: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_name: "0.0.0.0".to_string(),
            port: DEFAULT_VMC_PORT,
            force_update: false,
            debug: false,
        }
    }
}

impl ReceiverConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serializes to indented JSON, the format [`ReceiverConfig::load`] reads.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

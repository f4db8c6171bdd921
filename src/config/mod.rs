//! Configuration module for the sample bridge
//!
//! This module handles the bridge configuration:
//! - App-sink buffering policy applied at registration time
//! - Dispatcher bounds for a single wake
//! - Logging filter
//!
//! # Config Location
//!
//! The default config file lives in the platform-appropriate config directory
//! under `dev.hxyulin.sample-bridge/bridge.toml`:
//!
//! - **Linux**: `~/.config/dev.hxyulin.sample-bridge/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.sample-bridge/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.sample-bridge\`
//!
//! # Example
//!
//! ```ignore
//! use sample_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::load_or_default();
//! assert_eq!(config.sink.max_buffers, 1);
//! ```

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.sample-bridge";

/// Config filename
pub const CONFIG_FILE: &str = "bridge.toml";

/// Default app-sink queue depth
pub const DEFAULT_MAX_BUFFERS: u32 = 1;

/// Default upper bound on drain passes per wake
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Default upper bound on ordinary pulls per sink per pass
pub const DEFAULT_MAX_PULLS_PER_PASS: usize = 256;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

// ==================== Sink Config ====================

/// Buffering policy applied to every newly registered app sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Queue depth for sinks without an explicit depth
    #[serde(default = "default_max_buffers")]
    pub max_buffers: u32,

    /// Drop the oldest queued sample when the queue is full
    #[serde(default = "default_true")]
    pub drop: bool,

    /// Leave sinks that already carry a non-zero depth alone
    #[serde(default = "default_true")]
    pub respect_existing_depth: bool,
}

fn default_max_buffers() -> u32 {
    DEFAULT_MAX_BUFFERS
}

fn default_true() -> bool {
    true
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_buffers: DEFAULT_MAX_BUFFERS,
            drop: true,
            respect_existing_depth: true,
        }
    }
}

impl SinkConfig {
    /// Depth to apply to a sink whose current depth is `current` (0 = unlimited).
    ///
    /// Returns `None` when the sink should keep its depth.
    pub fn depth_for(&self, current: u32) -> Option<u32> {
        if self.respect_existing_depth && current != 0 {
            None
        } else {
            Some(self.max_buffers.max(1))
        }
    }
}

// ==================== Dispatch Config ====================

/// Bounds for a single drain on the consumer thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum drain passes before yielding back to the event loop
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,

    /// Maximum ordinary pulls per sink in one pass
    #[serde(default = "default_max_pulls")]
    pub max_pulls_per_pass: usize,
}

fn default_max_passes() -> usize {
    DEFAULT_MAX_PASSES
}

fn default_max_pulls() -> usize {
    DEFAULT_MAX_PULLS_PER_PASS
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            max_pulls_per_pass: DEFAULT_MAX_PULLS_PER_PASS,
        }
    }
}

// ==================== Logging Config ====================

/// Logging settings used by [`crate::logging::init`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

// ==================== Bridge Config ====================

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Path of the default config file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        default_config_path()
    }

    /// Load the default config file, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load bridge config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml_string()?)?;
        tracing::debug!("Saved bridge config to {:?}", path);
        Ok(())
    }

    /// Reject values the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_passes == 0 {
            return Err(BridgeError::Config(
                "dispatch.max_passes must be at least 1".to_string(),
            ));
        }
        if self.dispatch.max_pulls_per_pass == 0 {
            return Err(BridgeError::Config(
                "dispatch.max_pulls_per_pass must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

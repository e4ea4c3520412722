//! Engine configuration.
//!
//! Audio settings a host uses to prepare networks, loaded from TOML:
//!
//! ```toml
//! sample_rate = 48000.0
//! block_size = 256
//! num_channels = 2
//! polyphonic = true
//! num_voices = 8
//! network_dir = "networks"
//! ```
//!
//! Every field is optional and falls back to [`EngineConfig::default`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snex_core::{DEFAULT_NUM_VOICES, MAX_CHANNELS, PolyHandler, PrepareSpecs};

use crate::error::ConfigError;

/// Audio settings of the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Maximum block size in samples.
    pub block_size: usize,
    /// Number of audio channels.
    pub num_channels: usize,
    /// Whether networks render voices.
    pub polyphonic: bool,
    /// Number of voices when polyphonic.
    pub num_voices: usize,
    /// Where network descriptions are looked up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            block_size: 512,
            num_channels: 2,
            polyphonic: false,
            num_voices: DEFAULT_NUM_VOICES,
            network_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
            }
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name, reason: &str| {
            Err(ConfigError::InvalidSetting {
                name,
                reason: reason.to_string(),
            })
        };

        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return invalid("sample_rate", "must be a positive number");
        }
        if self.block_size == 0 {
            return invalid("block_size", "must not be zero");
        }
        if self.num_channels == 0 || self.num_channels > MAX_CHANNELS {
            return invalid("num_channels", &format!("must be between 1 and {MAX_CHANNELS}"));
        }
        if self.polyphonic && self.num_voices == 0 {
            return invalid("num_voices", "must not be zero in a polyphonic engine");
        }
        Ok(())
    }

    /// Voice count the networks are prepared with.
    pub fn voices(&self) -> usize {
        if self.polyphonic { self.num_voices } else { 1 }
    }

    /// Specs a network is prepared with.
    pub fn specs(&self) -> PrepareSpecs {
        let specs = PrepareSpecs::new(self.sample_rate, self.block_size, self.num_channels);
        if self.polyphonic {
            specs.with_poly_handler(Arc::new(PolyHandler::new(self.num_voices)))
        } else {
            specs
        }
    }

    /// Path of a network description in the network directory.
    ///
    /// Returns the `.toml` file if it exists, otherwise the `.json` file if
    /// that exists.
    pub fn find_network(&self, id: &str) -> Option<PathBuf> {
        let dir = self.network_dir.as_ref()?;
        ["toml", "json"]
            .into_iter()
            .map(|ext| dir.join(format!("{id}.{ext}")))
            .find(|p| p.is_file())
    }
}

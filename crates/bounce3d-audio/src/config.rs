//! Engine configuration file.
//!
//! Uses RON (Rust Object Notation) so the file stays readable and diffable.
//! Every field has a default; a missing file is not an error for callers that
//! fall back to [`EngineConfig::default`].

use crate::reverb::ReverbPreset;
use bounce3d_core::{Frames, Point3, block_sizes};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::assets::{COLLISION_SOUND, LAUNCH_SOUND};

/// Current config format version
pub const CONFIG_VERSION: u32 = 1;

/// Environment reverb settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    pub enabled: bool,
    pub preset: ReverbPreset,
    /// Wet output level in dB
    pub level_db: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: ReverbPreset::LargeHall,
            level_db: -20.0,
        }
    }
}

/// Audio engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Format version for future compatibility
    pub version: u32,

    /// Directory holding the bundled sounds
    pub asset_dir: PathBuf,

    /// Collision sound file name (inside `asset_dir`)
    pub collision_sound: String,

    /// Launch sound file name (inside `asset_dir`)
    pub launch_sound: String,

    /// Linear volume of the announcer voice
    pub launch_volume: f32,

    /// Initial listener position
    pub listener_position: Point3,

    pub reverb: ReverbConfig,

    /// Processing block size (frames)
    pub block_size: Frames,

    /// Render command queue capacity
    pub command_queue_capacity: usize,

    /// Maximum simultaneous voices the renderer pre-allocates for
    pub max_voices: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            asset_dir: PathBuf::from("assets"),
            collision_sound: COLLISION_SOUND.to_string(),
            launch_sound: LAUNCH_SOUND.to_string(),
            launch_volume: 0.35,
            listener_position: Point3::new(0.0, -2.0, 2.5),
            reverb: ReverbConfig::default(),
            block_size: block_sizes::BLOCK_256,
            command_queue_capacity: 1024,
            max_voices: 256,
        }
    }
}

impl EngineConfig {
    /// Save config to a RON file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be written or serialization fails
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        save_ron(self, path.as_ref())
    }

    /// Load config from a RON file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, deserialization fails or the
    /// contents are out of range
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_ron(path.as_ref())?;
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(config.version));
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::InvalidData("block_size must be > 0".into()));
        }
        if self.command_queue_capacity == 0 {
            return Err(ConfigError::InvalidData(
                "command_queue_capacity must be > 0".into(),
            ));
        }
        if self.max_voices == 0 {
            return Err(ConfigError::InvalidData("max_voices must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.launch_volume) {
            return Err(ConfigError::InvalidData(format!(
                "launch_volume {} outside 0.0..=1.0",
                self.launch_volume
            )));
        }
        Ok(())
    }
}

/// Serialize any config value to a pretty RON file
pub fn save_ron<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    let ron_string = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
        .map_err(|e| ConfigError::SerializationFailed(e.to_string()))?;

    std::fs::write(path, ron_string).map_err(|e| ConfigError::IoError(e.to_string()))?;
    tracing::debug!("Wrote config to {}", path.display());
    Ok(())
}

/// Deserialize any config value from a RON file
pub fn load_ron<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let ron_string =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    ron::from_str(&ron_string).map_err(|e| ConfigError::DeserializationFailed(e.to_string()))
}

/// Errors that can occur while reading or writing config files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid config data: {0}")]
    InvalidData(String),
}

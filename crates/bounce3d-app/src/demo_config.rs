//! Demo configuration (RON).

use crate::scene::SceneConfig;
use bounce3d_audio::config::{ConfigError, load_ron, save_ron};
use bounce3d_audio::EngineConfig;
use bounce3d_core::Point3;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEMO_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub version: u32,

    pub engine: EngineConfig,

    pub scene: SceneConfig,

    /// Where balls are launched from (and where the launch sound plays)
    pub launch_position: Point3,

    /// Pause between launches
    pub spawn_interval_secs: f32,

    /// Oldest balls are removed beyond this count
    pub max_balls: usize,

    /// Physics steps per second
    pub tick_hz: u32,

    /// Listener yaw sweep (degrees per second), 0 = still
    pub sweep_degrees_per_sec: f32,

    /// Fixed RNG seed for reproducible launches
    pub seed: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            version: DEMO_CONFIG_VERSION,
            engine: EngineConfig::default(),
            scene: SceneConfig::default(),
            launch_position: Point3::new(0.0, -2.0, 2.5),
            spawn_interval_secs: 4.0,
            max_balls: 16,
            tick_hz: 120,
            sweep_degrees_per_sec: 0.0,
            seed: None,
        }
    }
}

impl DemoConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_ron(path.as_ref())?;
        if config.version > DEMO_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(config.version));
        }
        config.engine.validate()?;
        if config.tick_hz == 0 {
            return Err(ConfigError::InvalidData("tick_hz must be > 0".into()));
        }
        if config.spawn_interval_secs.is_nan() || config.spawn_interval_secs <= 0.0 {
            return Err(ConfigError::InvalidData(
                "spawn_interval_secs must be > 0".into(),
            ));
        }
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        save_ron(self, path.as_ref())
    }
}

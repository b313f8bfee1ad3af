//! Positional audio engine.
//!
//! This crate maps collision impulses to sound, selects an output topology
//! from the hardware, keeps one voice per game entity connected into a mix
//! graph, and rebuilds that graph when the output device changes or the
//! audio session is interrupted. Rendering happens on a real-time thread fed
//! by lock-free queues; cpal provides the output.

pub mod assets;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod graph;
pub mod impulse;
pub mod pool;
pub mod pump;
pub mod renderer;
pub mod reverb;
pub mod spatial;
pub mod topology;
pub mod voice;

pub use assets::{AssetBank, SampleBuffer};
pub use config::{ConfigError, EngineConfig};
pub use controller::{AudioGraphController, EngineState};
pub use device::{CpalDevice, DeviceError, HardwareFormat, OfflineDevice, OfflineHandle, OutputDevice};
pub use error::{EngineError, Result};
pub use pump::EventPump;
pub use topology::{ChannelLayoutTag, RenderingAlgorithm, Topology, select_topology};
pub use voice::{VoiceId, VoiceSnapshot, VoiceState};

//! Output topology selection.
//!
//! Picks the channel layout the environment node renders into and the 3D
//! rendering algorithm voices use, based on what the hardware reports.

use bounce3d_core::{ChannelCount, SampleRate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Spatialization technique used to place a voice in 3D space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderingAlgorithm {
    /// Stereo equal-power panning
    #[default]
    EqualPowerPanning,
    /// Multichannel sound-field rendering
    SoundField,
}

/// Channel layouts the environment node knows how to render to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayoutTag {
    Stereo,
    /// Quadraphonic: L R Ls Rs
    AudioUnit4,
    /// L R Ls Rs C
    AudioUnit5_0,
    /// L R Ls Rs C Cs
    AudioUnit6_0,
    /// L R Ls Rs C Rls Rrs
    AudioUnit7_0,
    /// L R Ls Rs C Cs Lw Rw
    AudioUnit8,
}

impl ChannelLayoutTag {
    /// Layout for an exact hardware channel count, if one exists
    pub fn for_channel_count(channels: ChannelCount) -> Option<Self> {
        match channels {
            2 => Some(Self::Stereo),
            4 => Some(Self::AudioUnit4),
            5 => Some(Self::AudioUnit5_0),
            6 => Some(Self::AudioUnit6_0),
            7 => Some(Self::AudioUnit7_0),
            8 => Some(Self::AudioUnit8),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Stereo => "Stereo",
            Self::AudioUnit4 => "AudioUnit_4",
            Self::AudioUnit5_0 => "AudioUnit_5_0",
            Self::AudioUnit6_0 => "AudioUnit_6_0",
            Self::AudioUnit7_0 => "AudioUnit_7_0",
            Self::AudioUnit8 => "AudioUnit_8",
        }
    }

    pub fn channel_count(self) -> ChannelCount {
        self.speaker_azimuths().len()
    }

    /// Speaker azimuths in degrees (0 = front, positive = right), in channel order
    pub fn speaker_azimuths(self) -> &'static [f32] {
        match self {
            Self::Stereo => &[-30.0, 30.0],
            Self::AudioUnit4 => &[-45.0, 45.0, -135.0, 135.0],
            Self::AudioUnit5_0 => &[-30.0, 30.0, -110.0, 110.0, 0.0],
            Self::AudioUnit6_0 => &[-30.0, 30.0, -110.0, 110.0, 0.0, 180.0],
            Self::AudioUnit7_0 => &[-30.0, 30.0, -90.0, 90.0, 0.0, -150.0, 150.0],
            Self::AudioUnit8 => &[-30.0, 30.0, -110.0, 110.0, 0.0, 180.0, -60.0, 60.0],
        }
    }
}

impl fmt::Display for ChannelLayoutTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output topology derived from the current hardware description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub channels: ChannelCount,
    pub layout: ChannelLayoutTag,
    pub sample_rate: SampleRate,
    pub algorithm: RenderingAlgorithm,
}

impl Topology {
    /// Plain stereo at the given rate
    pub fn stereo(sample_rate: SampleRate) -> Self {
        Self {
            channels: 2,
            layout: ChannelLayoutTag::Stereo,
            sample_rate,
            algorithm: RenderingAlgorithm::EqualPowerPanning,
        }
    }

    pub fn is_multichannel(&self) -> bool {
        self.algorithm == RenderingAlgorithm::SoundField
    }
}

/// Select a topology for the hardware output.
///
/// More than two channels (except three) selects a multichannel layout and
/// sound-field rendering. Counts without a layout (e.g. more than eight) and
/// everything else fall back to stereo with equal-power panning.
pub fn select_topology(hardware_channels: ChannelCount, hardware_sample_rate: SampleRate) -> Topology {
    if hardware_channels > 2 && hardware_channels != 3 {
        if let Some(layout) = ChannelLayoutTag::for_channel_count(hardware_channels) {
            return Topology {
                channels: layout.channel_count(),
                layout,
                sample_rate: hardware_sample_rate,
                algorithm: RenderingAlgorithm::SoundField,
            };
        }
        tracing::warn!(
            "No channel layout for {} hardware channels, falling back to stereo",
            hardware_channels
        );
    }

    Topology::stereo(hardware_sample_rate)
}

/// Process-wide "multichannel output enabled" flag.
///
/// Written only by the controller while it holds the graph-mutation lock;
/// readable from any thread.
#[derive(Debug, Default)]
pub struct MultichannelFlag(AtomicBool);

impl MultichannelFlag {
    /// Record the topology that was just selected
    pub fn apply(&self, topology: &Topology) {
        self.0.store(topology.is_multichannel(), Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Rendering algorithm new voices should use
    pub fn algorithm(&self) -> RenderingAlgorithm {
        if self.is_enabled() {
            RenderingAlgorithm::SoundField
        } else {
            RenderingAlgorithm::EqualPowerPanning
        }
    }
}

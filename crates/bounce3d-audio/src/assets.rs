//! Bundled sound loading.
//!
//! Sounds are decoded once at startup into mono `f32` buffers and shared
//! with the renderer through `Arc`. A missing or unreadable sound is fatal.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use bounce3d_core::{Sample, SampleRate};
use dasp::sample::{I24, Sample as _};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::sync::Arc;

/// Sound played on every collision
pub const COLLISION_SOUND: &str = "bounce.wav";
/// Sound played before every launch
pub const LAUNCH_SOUND: &str = "launchSound.wav";

/// Pre-decoded mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Box<[Sample]>,
    sample_rate: SampleRate,
}

impl SampleBuffer {
    pub fn new(samples: Vec<Sample>, sample_rate: SampleRate) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
            sample_rate,
        }
    }

    /// Build from interleaved frames, averaging channels down to mono
    pub fn from_interleaved(interleaved: &[Sample], channels: usize, sample_rate: SampleRate) -> Self {
        let channels = channels.max(1);
        let mono = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<Sample>() / channels as Sample)
            .collect();
        Self::new(mono, sample_rate)
    }

    /// Load a WAV file (integer or float PCM, any channel count)
    pub fn load_wav(path: &Path) -> Result<Self> {
        let asset_error = |reason: String| EngineError::AssetLoad {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = WavReader::open(path).map_err(|e| asset_error(e.to_string()))?;
        let spec = reader.spec();

        let interleaved: Vec<Sample> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| asset_error(e.to_string()))?,
            (SampleFormat::Int, 8) => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v.to_sample::<f32>()))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| asset_error(e.to_string()))?,
            (SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v.to_sample::<f32>()))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| asset_error(e.to_string()))?,
            (SampleFormat::Int, 24) => reader
                .samples::<i32>()
                .map(|s| s.map(|v| I24::new_unchecked(v).to_sample::<f32>()))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| asset_error(e.to_string()))?,
            (SampleFormat::Int, 32) => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v.to_sample::<f32>()))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| asset_error(e.to_string()))?,
            (format, bits) => {
                return Err(asset_error(format!(
                    "unsupported sample format {format:?} with {bits} bits"
                )));
            }
        };

        if interleaved.is_empty() {
            return Err(asset_error("file contains no audio".to_string()));
        }

        let buffer = Self::from_interleaved(&interleaved, usize::from(spec.channels), spec.sample_rate);
        tracing::debug!(
            "Loaded {} ({} frames @ {}Hz, {} channels downmixed)",
            path.display(),
            buffer.len(),
            spec.sample_rate,
            spec.channels
        );
        Ok(buffer)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Length in frames
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Linearly interpolated sample at a fractional frame position
    pub fn sample_at(&self, position: f64) -> Sample {
        if position < 0.0 {
            return 0.0;
        }
        let index = position as usize;
        let Some(&current) = self.samples.get(index) else {
            return 0.0;
        };
        let next = self.samples.get(index + 1).copied().unwrap_or(0.0);
        let frac = (position - index as f64) as f32;
        (next - current).mul_add(frac, current)
    }
}

/// The two sounds the game uses
#[derive(Debug, Clone)]
pub struct AssetBank {
    pub collision: Arc<SampleBuffer>,
    pub launch: Arc<SampleBuffer>,
}

impl AssetBank {
    /// Load both sounds from the configured asset directory
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let collision = SampleBuffer::load_wav(&config.asset_dir.join(&config.collision_sound))?;
        let launch = SampleBuffer::load_wav(&config.asset_dir.join(&config.launch_sound))?;
        tracing::info!(
            "Loaded sounds from {} (collision {} frames, launch {} frames)",
            config.asset_dir.display(),
            collision.len(),
            launch.len()
        );
        Ok(Self {
            collision: Arc::new(collision),
            launch: Arc::new(launch),
        })
    }

    pub fn from_buffers(collision: SampleBuffer, launch: SampleBuffer) -> Self {
        Self {
            collision: Arc::new(collision),
            launch: Arc::new(launch),
        }
    }
}

//! Core types and constants shared across the bounce3d workspace.
//!
//! Everything here is plain data: sample types, 3D points, listener
//! orientation and the handle the game uses to identify its entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Sample rate in Hz
pub type SampleRate = u32;

/// Number of audio frames (samples per channel)
pub type Frames = usize;

/// Audio sample type
pub type Sample = f32;

/// Number of audio channels
pub type ChannelCount = usize;

/// Common sample rates
pub mod sample_rates {
    use super::SampleRate;

    /// 44.1 kHz sample rate (CD quality)
    pub const SR_44100: SampleRate = 44100;
    /// 48 kHz sample rate (professional audio standard)
    pub const SR_48000: SampleRate = 48000;
    /// 96 kHz sample rate (high resolution audio)
    pub const SR_96000: SampleRate = 96000;
}

/// Audio buffer block sizes
pub mod block_sizes {
    use super::Frames;

    /// 128 frames per block (low latency, ~2.7ms @ 48kHz)
    pub const BLOCK_128: Frames = 128;
    /// 256 frames per block (balanced, ~5.3ms @ 48kHz)
    pub const BLOCK_256: Frames = 256;
    /// 512 frames per block (higher latency, ~10.7ms @ 48kHz)
    pub const BLOCK_512: Frames = 512;
}

/// A point (or direction) in world space.
///
/// Right-handed coordinates: +X right, +Y up, -Z forward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length
    #[must_use]
    pub fn length(self) -> f32 {
        self.z.mul_add(self.z, self.x.mul_add(self.x, self.y * self.y)).sqrt()
    }
}

impl Add for Point3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<[f32; 3]> for Point3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// Listener orientation in degrees.
///
/// - `yaw`: positive turns the listener to the right (about +Y)
/// - `pitch`: positive looks up (about +X)
/// - `roll`: positive tilts the right ear down (about -Z)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ListenerOrientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl ListenerOrientation {
    #[must_use]
    pub const fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }
}

/// Identifier of a game entity that owns a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(pub u64);

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rates() {
        assert_eq!(sample_rates::SR_48000, 48000);
    }

    #[test]
    fn test_point_arithmetic() {
        let a = Point3::new(1.0, 2.0, 3.0);
        let b = Point3::new(0.5, 0.5, 0.5);
        assert_eq!(a - b, Point3::new(0.5, 1.5, 2.5));
        assert_eq!(a + b, Point3::new(1.5, 2.5, 3.5));
        assert_eq!(b * 2.0, Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_point_length() {
        let a = Point3::new(3.0, 0.0, 0.0);
        let b = Point3::new(0.0, 4.0, 0.0);
        assert!(((a - b).length() - 5.0).abs() < 1e-6);
        assert_eq!(Point3::ORIGIN.length(), 0.0);
    }

    #[test]
    fn test_entity_handle_display() {
        assert_eq!(EntityHandle(7).to_string(), "entity#7");
    }
}

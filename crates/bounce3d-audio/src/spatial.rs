//! 3D placement math for the environment node.
//!
//! Turns a source position and the listener pose into per-output-channel
//! gains, using either stereo equal-power panning or a multichannel
//! sound-field spread over the layout's speakers.

use crate::topology::{ChannelLayoutTag, RenderingAlgorithm};
use bounce3d_comms::ListenerPose;
use bounce3d_core::Point3;
use smallvec::SmallVec;
use std::f32::consts::FRAC_PI_2;

/// Inverse-distance attenuation reference distance
pub const REFERENCE_DISTANCE: f32 = 1.0;
/// Inverse-distance attenuation rolloff factor
pub const ROLLOFF_FACTOR: f32 = 1.0;

/// Per-output-channel gains (stack storage for up to 8 channels)
pub type SpeakerGains = SmallVec<[f32; 8]>;

/// Source direction as heard by the listener
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceDirection {
    /// Degrees, 0 = straight ahead, positive = to the right, in (-180, 180]
    pub azimuth: f32,
    /// Degrees, positive = above
    pub elevation: f32,
    pub distance: f32,
}

fn rotate_y(v: Point3, degrees: f32) -> Point3 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Point3::new(v.x.mul_add(cos, v.z * sin), v.y, (-v.x).mul_add(sin, v.z * cos))
}

fn rotate_x(v: Point3, degrees: f32) -> Point3 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Point3::new(v.x, v.y.mul_add(cos, v.z * sin), (-v.y).mul_add(sin, v.z * cos))
}

fn rotate_z(v: Point3, degrees: f32) -> Point3 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Point3::new(v.x.mul_add(cos, -(v.y * sin)), v.x.mul_add(sin, v.y * cos), v.z)
}

/// Where `source` lies relative to the listener's head
pub fn relative_direction(listener: &ListenerPose, source: Point3) -> SourceDirection {
    let offset = source - listener.position;
    let distance = offset.length();
    if distance <= f32::EPSILON {
        return SourceDirection {
            azimuth: 0.0,
            elevation: 0.0,
            distance: 0.0,
        };
    }

    // Undo the listener's yaw, then pitch, then roll
    let orientation = listener.orientation;
    let local = rotate_z(
        rotate_x(rotate_y(offset, orientation.yaw), orientation.pitch),
        orientation.roll,
    );

    let horizontal = local.x.hypot(local.z);
    SourceDirection {
        azimuth: local.x.atan2(-local.z).to_degrees(),
        elevation: local.y.atan2(horizontal).to_degrees(),
        distance,
    }
}

/// Inverse distance attenuation, unity inside the reference distance
pub fn distance_gain(distance: f32) -> f32 {
    let clamped = distance.max(REFERENCE_DISTANCE);
    REFERENCE_DISTANCE / ROLLOFF_FACTOR.mul_add(clamped - REFERENCE_DISTANCE, REFERENCE_DISTANCE)
}

/// Constant-power pan gains.
///
/// Returns (`left_gain`, `right_gain`) with L² + R² = 1:
/// - pan = -1.0: (1.0, 0.0) - full left
/// - pan =  0.0: (0.707, 0.707) - center
/// - pan =  1.0: (0.0, 1.0) - full right
pub fn equal_power_gains(pan: f32) -> (f32, f32) {
    let pan_normalized = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5;
    let angle = pan_normalized * FRAC_PI_2;
    (angle.cos(), angle.sin())
}

fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

/// Fill `gains` with one gain per output channel of `layout`.
///
/// Distance attenuation is not included; see [`distance_gain`].
pub fn speaker_gains(
    direction: &SourceDirection,
    algorithm: RenderingAlgorithm,
    layout: ChannelLayoutTag,
    gains: &mut SpeakerGains,
) {
    gains.clear();
    let speakers = layout.speaker_azimuths();
    gains.resize(speakers.len(), 0.0);

    match algorithm {
        RenderingAlgorithm::EqualPowerPanning => {
            // Front/back ambiguity is inherent to stereo panning
            let pan = direction.azimuth.to_radians().sin();
            let (left, right) = equal_power_gains(pan);
            gains[0] = left;
            if gains.len() > 1 {
                gains[1] = right;
            }
        }
        RenderingAlgorithm::SoundField => {
            let omni = 1.0 / (speakers.len() as f32).sqrt();
            let elevation_blend = direction.elevation.to_radians().sin().abs();

            for (gain, &speaker) in gains.iter_mut().zip(speakers) {
                let difference = wrap_degrees(direction.azimuth - speaker).to_radians();
                let lobe = 0.5 * (1.0 + difference.cos());
                let directional = lobe * lobe;
                *gain = (1.0 - elevation_blend).mul_add(directional, elevation_blend * omni);
            }

            let power: f32 = gains.iter().map(|g| g * g).sum();
            if power > f32::EPSILON {
                let norm = power.sqrt().recip();
                for gain in gains.iter_mut() {
                    *gain *= norm;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounce3d_core::ListenerOrientation;

    fn listener_at_origin(yaw: f32, pitch: f32, roll: f32) -> ListenerPose {
        ListenerPose {
            position: Point3::ORIGIN,
            orientation: ListenerOrientation::new(yaw, pitch, roll),
        }
    }

    #[test]
    fn test_constant_power_gains() {
        let (left, right) = equal_power_gains(0.0);
        assert!((left - 0.707).abs() < 0.01);
        assert!((right - 0.707).abs() < 0.01);
        let power = left.mul_add(left, right * right);
        assert!((power - 1.0).abs() < 0.01);

        let (left, right) = equal_power_gains(-1.0);
        assert!((left - 1.0).abs() < 0.01);
        assert!(right.abs() < 0.01);

        let (left, right) = equal_power_gains(1.0);
        assert!(left.abs() < 0.01);
        assert!((right - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_source_ahead() {
        let direction = relative_direction(&listener_at_origin(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, -3.0));
        assert!(direction.azimuth.abs() < 1e-4);
        assert!(direction.elevation.abs() < 1e-4);
        assert!((direction.distance - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_source_to_the_right() {
        let direction = relative_direction(&listener_at_origin(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0));
        assert!((direction.azimuth - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_yaw_brings_right_source_to_front() {
        let direction = relative_direction(&listener_at_origin(90.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        assert!(direction.azimuth.abs() < 1e-3, "azimuth {}", direction.azimuth);
    }

    #[test]
    fn test_pitch_brings_overhead_source_to_front() {
        let direction = relative_direction(&listener_at_origin(0.0, 90.0, 0.0), Point3::new(0.0, 1.0, 0.0));
        assert!(direction.elevation.abs() < 1e-3);
        assert!(direction.azimuth.abs() < 1e-3);
    }

    #[test]
    fn test_roll_lowers_right_source() {
        let direction = relative_direction(&listener_at_origin(0.0, 0.0, 90.0), Point3::new(0.0, -1.0, 0.0));
        assert!((direction.azimuth - 90.0).abs() < 1e-3, "azimuth {}", direction.azimuth);
    }

    #[test]
    fn test_listener_offset() {
        let listener = ListenerPose {
            position: Point3::new(0.0, -2.0, 2.5),
            orientation: ListenerOrientation::default(),
        };
        let direction = relative_direction(&listener, Point3::new(0.0, -2.0, 0.5));
        assert!(direction.azimuth.abs() < 1e-3);
        assert!((direction.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_coincident_source() {
        let direction = relative_direction(&listener_at_origin(0.0, 0.0, 0.0), Point3::ORIGIN);
        assert_eq!(direction.distance, 0.0);
        assert_eq!(direction.azimuth, 0.0);
    }

    #[test]
    fn test_distance_gain() {
        assert_eq!(distance_gain(0.0), 1.0);
        assert_eq!(distance_gain(1.0), 1.0);
        assert!((distance_gain(2.0) - 0.5).abs() < 1e-6);
        assert!(distance_gain(10.0) < distance_gain(5.0));
    }

    #[test]
    fn test_equal_power_centered_source() {
        let mut gains = SpeakerGains::new();
        let direction = SourceDirection {
            azimuth: 0.0,
            elevation: 0.0,
            distance: 1.0,
        };
        speaker_gains(&direction, RenderingAlgorithm::EqualPowerPanning, ChannelLayoutTag::Stereo, &mut gains);
        assert_eq!(gains.len(), 2);
        assert!((gains[0] - gains[1]).abs() < 1e-6);
    }

    #[test]
    fn test_equal_power_on_multichannel_uses_front_pair() {
        let mut gains = SpeakerGains::new();
        let direction = SourceDirection {
            azimuth: 90.0,
            elevation: 0.0,
            distance: 1.0,
        };
        speaker_gains(&direction, RenderingAlgorithm::EqualPowerPanning, ChannelLayoutTag::AudioUnit6_0, &mut gains);
        assert_eq!(gains.len(), 6);
        assert!(gains[0].abs() < 1e-6);
        assert!((gains[1] - 1.0).abs() < 1e-6);
        assert!(gains[2..].iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_sound_field_is_unit_power() {
        let mut gains = SpeakerGains::new();
        for azimuth in [-170.0, -90.0, -10.0, 0.0, 45.0, 120.0, 180.0] {
            for elevation in [-60.0, 0.0, 30.0] {
                let direction = SourceDirection {
                    azimuth,
                    elevation,
                    distance: 2.0,
                };
                speaker_gains(&direction, RenderingAlgorithm::SoundField, ChannelLayoutTag::AudioUnit8, &mut gains);
                let power: f32 = gains.iter().map(|g| g * g).sum();
                assert!((power - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_sound_field_favours_nearest_speaker() {
        let mut gains = SpeakerGains::new();
        // Speaker 5 of AudioUnit_6_0 is the rear centre
        let direction = SourceDirection {
            azimuth: 180.0,
            elevation: 0.0,
            distance: 1.0,
        };
        speaker_gains(&direction, RenderingAlgorithm::SoundField, ChannelLayoutTag::AudioUnit6_0, &mut gains);
        let loudest = gains
            .iter()
            .enumerate()
            .fold((0, 0.0_f32), |best, (i, &g)| if g > best.1 { (i, g) } else { best });
        assert_eq!(loudest.0, 5);
    }

    #[test]
    fn test_sound_field_overhead_is_even() {
        let mut gains = SpeakerGains::new();
        let direction = SourceDirection {
            azimuth: 0.0,
            elevation: 90.0,
            distance: 1.0,
        };
        speaker_gains(&direction, RenderingAlgorithm::SoundField, ChannelLayoutTag::AudioUnit4, &mut gains);
        for gain in &gains {
            assert!((gain - 0.5).abs() < 1e-4);
        }
    }
}

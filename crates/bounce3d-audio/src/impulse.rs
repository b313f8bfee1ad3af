//! Collision impulse → voice gain and playback rate.
//!
//! Harder hits are louder and slightly higher pitched; soft taps drop in
//! pitch as the ball loses energy.

/// Impulses above this are treated as maximal
pub const IMPULSE_MAX: f32 = 12.0;
/// Impulses below this play at the minimum rate
pub const IMPULSE_MIN: f32 = 0.6;
/// Gain (in dB) of the weakest audible collision
pub const VOL_MIN_DB: f32 = -20.0;
/// Playback rate of the weakest collision
pub const RATE_MIN: f32 = 0.95;
/// Playback rate of the strongest collision
pub const RATE_MAX: f32 = 1.2;
/// Contacts at or below this impulse are not sonified
pub const COLLISION_IMPULSE_THRESHOLD: f32 = 0.6;

/// Linear gain for a collision impulse.
///
/// Maps `[.., IMPULSE_MAX]` linearly onto `[VOL_MIN_DB, 0 dB]` and converts to
/// linear amplitude. There is no lower clamp, so very small (or negative)
/// impulses keep getting quieter.
pub fn gain_for_impulse(impulse: f32) -> f32 {
    let impulse = impulse.min(IMPULSE_MAX);
    let vol_db = (impulse / IMPULSE_MAX).mul_add(-VOL_MIN_DB, VOL_MIN_DB);
    10.0_f32.powf(vol_db / 20.0)
}

/// Playback rate for a collision impulse, in `[RATE_MIN, RATE_MAX]`.
pub fn playback_rate_for_impulse(impulse: f32) -> f32 {
    let impulse = impulse.clamp(IMPULSE_MIN, IMPULSE_MAX);
    let normalized = (impulse - IMPULSE_MIN) / (IMPULSE_MAX - IMPULSE_MIN);
    normalized.mul_add(RATE_MAX - RATE_MIN, RATE_MIN)
}

/// Whether a contact is strong enough to be heard
pub fn is_audible_impulse(impulse: f32) -> bool {
    impulse > COLLISION_IMPULSE_THRESHOLD
}

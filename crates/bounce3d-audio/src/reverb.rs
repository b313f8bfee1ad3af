//! Environment reverb.
//!
//! A Schroeder reverb (four damped combs in parallel, two allpasses in
//! series) running on a mono send bus. Every voice feeds it in proportion to
//! its reverb blend; the wet signal is spread evenly over the output channels.
//!
//! Delay lines are allocated when the reverb is built (control thread), never
//! while rendering.

use bounce3d_core::SampleRate;
use serde::{Deserialize, Serialize};

/// Factory room presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReverbPreset {
    SmallRoom,
    MediumHall,
    #[default]
    LargeHall,
}

impl ReverbPreset {
    /// (room scale, comb feedback, damping)
    fn tuning(self) -> (f32, f32, f32) {
        match self {
            Self::SmallRoom => (0.6, 0.70, 0.40),
            Self::MediumHall => (1.2, 0.80, 0.30),
            Self::LargeHall => (1.8, 0.86, 0.20),
        }
    }
}

/// Comb delays in ms at room scale 1.0 (mutually prime ratios)
const COMB_DELAYS_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
/// Allpass delays in ms
const ALLPASS_DELAYS_MS: [f32; 2] = [5.0, 1.7];
const ALLPASS_FEEDBACK: f32 = 0.5;

fn delay_samples(ms: f32, sample_rate: SampleRate) -> usize {
    ((ms * sample_rate as f32 / 1000.0) as usize).max(1)
}

struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    feedback: f32,
    damp: f32,
    filter_state: f32,
}

impl CombFilter {
    fn new(len: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; len],
            write_pos: 0,
            feedback: feedback.clamp(0.0, 0.99),
            damp: damp.clamp(0.0, 1.0),
            filter_state: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.write_pos];
        // One-pole lowpass in the loop absorbs high frequencies
        self.filter_state = output.mul_add(1.0 - self.damp, self.filter_state * self.damp);
        self.buffer[self.write_pos] = self.filter_state.mul_add(self.feedback, input);
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl AllpassFilter {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            write_pos: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.write_pos];
        let output = (-ALLPASS_FEEDBACK).mul_add(input, delayed);
        self.buffer[self.write_pos] = ALLPASS_FEEDBACK.mul_add(output, input);
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Mono-in, mono-out room reverb
pub struct EnvironmentReverb {
    combs: [CombFilter; 4],
    allpasses: [AllpassFilter; 2],
    /// Linear output level
    level: f32,
    enabled: bool,
}

impl EnvironmentReverb {
    pub fn new(preset: ReverbPreset, level_db: f32, sample_rate: SampleRate) -> Self {
        let (scale, feedback, damp) = preset.tuning();
        let comb = |ms: f32| CombFilter::new(delay_samples(ms * scale, sample_rate), feedback, damp);
        Self {
            combs: COMB_DELAYS_MS.map(comb),
            allpasses: ALLPASS_DELAYS_MS.map(|ms| AllpassFilter::new(delay_samples(ms, sample_rate))),
            level: 10.0_f32.powf(level_db / 20.0),
            enabled: true,
        }
    }

    /// A reverb that outputs silence
    pub fn disabled(sample_rate: SampleRate) -> Self {
        let mut reverb = Self::new(ReverbPreset::SmallRoom, f32::NEG_INFINITY, sample_rate);
        reverb.enabled = false;
        reverb
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn process(&mut self, input: f32) -> f32 {
        if !self.enabled {
            return 0.0;
        }
        let mut wet: f32 = self.combs.iter_mut().map(|comb| comb.process(input)).sum();
        wet *= 0.25;
        for allpass in &mut self.allpasses {
            wet = allpass.process(wet);
        }
        wet * self.level
    }

    pub fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.reset();
        }
        for allpass in &mut self.allpasses {
            allpass.reset();
        }
    }
}

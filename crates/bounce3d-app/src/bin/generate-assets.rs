//! Generate the demo's sound assets
//!
//! Writes `bounce.wav` (a short damped thunk) and `launchSound.wav` (a
//! rising whoosh) as mono 32-bit float WAV files.

use anyhow::{Context, Result};
use clap::Parser;
use hound::{WavSpec, WavWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use bounce3d_audio::assets::{COLLISION_SOUND, LAUNCH_SOUND};

/// Generate bounce3d sound assets
#[derive(Parser, Debug)]
#[command(name = "generate-assets")]
#[command(about = "Synthesize the bounce and launch sounds", long_about = None)]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "assets")]
    output: PathBuf,

    /// Sample rate (Hz)
    #[arg(short, long, default_value_t = 44100)]
    sample_rate: u32,
}

/// Damped low sine with a click of noise on the attack
fn bounce(sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f32;
    let frames = (sr * 0.25) as usize;
    let mut rng = StdRng::seed_from_u64(0x0b0c);

    (0..frames)
        .map(|frame| {
            let t = frame as f32 / sr;
            // Pitch drops as the ball squashes
            let freq = 70.0f32.mul_add((-t * 40.0).exp(), 110.0);
            let body = (2.0 * PI * freq * t).sin() * (-t * 18.0).exp();
            let noise: f32 = rng.gen_range(-1.0..1.0);
            let click = noise * (-t * 400.0).exp();
            0.8 * body + 0.3 * click
        })
        .collect()
}

/// Filtered noise swelling upward over half a second
fn launch(sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f32;
    let frames = (sr * 0.6) as usize;
    let mut rng = StdRng::seed_from_u64(0x1a0c);
    let mut lowpass = 0.0f32;

    (0..frames)
        .map(|frame| {
            let t = frame as f32 / sr;
            let progress = t / 0.6;
            // One-pole lowpass opening from ~300 Hz to ~4 kHz
            let cutoff = 300.0 + 3700.0 * progress;
            let coefficient = 1.0 - (-2.0 * PI * cutoff / sr).exp();
            let noise: f32 = rng.gen_range(-1.0..1.0);
            lowpass += coefficient * (noise - lowpass);

            let envelope = (progress * PI).sin();
            0.6 * lowpass * envelope
        })
        .collect()
}

fn write_mono(path: &Path, sample_rate: u32, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample).context("Failed to write sample")?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;

    println!("  {} ({} frames)", path.display(), samples.len());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create directory: {}", args.output.display()))?;

    println!("Generating assets at {} Hz:", args.sample_rate);
    write_mono(
        &args.output.join(COLLISION_SOUND),
        args.sample_rate,
        &bounce(args.sample_rate),
    )?;
    write_mono(
        &args.output.join(LAUNCH_SOUND),
        args.sample_rate,
        &launch(args.sample_rate),
    )?;

    Ok(())
}

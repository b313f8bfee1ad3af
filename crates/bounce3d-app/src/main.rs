//! bounce3d - positional audio bouncing-ball demo
//!
//! Balls are launched into a cube every few seconds; every wall hit plays a
//! spatialized bounce from the ball's own voice.

mod demo_config;
mod scene;
mod spawner;

use anyhow::{Context, Result};
use clap::Parser;
use hound::{WavSpec, WavWriter};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bounce3d_audio::impulse::is_audible_impulse;
use bounce3d_audio::{
    AssetBank, AudioGraphController, CpalDevice, EngineError, EventPump, HardwareFormat,
    OfflineDevice, OfflineHandle, OutputDevice,
};
use bounce3d_comms::platform_events;
use bounce3d_core::ListenerOrientation;

use demo_config::DemoConfig;
use scene::Scene;
use spawner::{Spawner, SpawnerSettings};

const OFFLINE_SAMPLE_RATE: u32 = 48000;

/// Positional audio bouncing-ball demo
#[derive(Parser, Debug)]
#[command(name = "bounce3d")]
#[command(about = "Spatialized bouncing balls", long_about = None)]
struct Args {
    /// Demo configuration (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding bounce.wav and launchSound.wav
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Render without an audio device
    #[arg(long)]
    offline: bool,

    /// Channel count of the simulated output (offline only)
    #[arg(long, default_value_t = 2, requires = "offline")]
    channels: usize,

    /// Write the offline mix to a WAV file
    #[arg(long, requires = "offline")]
    record: Option<PathBuf>,

    /// Stop after this many seconds (default: run until interrupted)
    #[arg(short, long)]
    duration: Option<f32>,

    /// Maximum number of balls in flight
    #[arg(long)]
    max_balls: Option<usize>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,

    /// Turn the listener at this many degrees per second
    #[arg(long)]
    sweep: Option<f32>,

    /// RNG seed for launch directions
    #[arg(long)]
    seed: Option<u64>,
}

/// Pulls audio from an offline device at the tick rate
struct OfflineDriver {
    handle: OfflineHandle,
    frames_per_tick: usize,
    buffer: Vec<f32>,
    recorder: Option<WavWriter<BufWriter<File>>>,
}

impl OfflineDriver {
    fn new(handle: OfflineHandle, tick_hz: u32, record: Option<&PathBuf>) -> Result<Self> {
        let format = handle.format();
        let recorder = record
            .map(|path| {
                let spec = WavSpec {
                    channels: u16::try_from(format.channels).context("Too many channels to record")?,
                    sample_rate: format.sample_rate,
                    bits_per_sample: 32,
                    sample_format: hound::SampleFormat::Float,
                };
                WavWriter::create(path, spec)
                    .with_context(|| format!("Failed to create recording: {}", path.display()))
            })
            .transpose()?;

        Ok(Self {
            handle,
            frames_per_tick: (format.sample_rate / tick_hz).max(1) as usize,
            buffer: Vec::new(),
            recorder,
        })
    }

    fn tick(&mut self) -> Result<()> {
        let channels = self.handle.format().channels;
        self.buffer.resize(self.frames_per_tick * channels, 0.0);
        self.handle.render_into(&mut self.buffer);

        if let Some(recorder) = self.recorder.as_mut() {
            for &sample in &self.buffer {
                recorder.write_sample(sample).context("Failed to write sample")?;
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        if let Some(recorder) = self.recorder {
            let frames = recorder.duration();
            recorder.finalize().context("Failed to finalize recording")?;
            tracing::info!("Recorded {} frames", frames);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bounce3d=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        DemoConfig::default()
            .save(path)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => DemoConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => DemoConfig::default(),
    };
    if let Some(dir) = &args.assets {
        config.engine.asset_dir.clone_from(dir);
    }
    if let Some(max_balls) = args.max_balls {
        config.max_balls = max_balls;
    }
    if let Some(sweep) = args.sweep {
        config.sweep_degrees_per_sec = sweep;
    }
    tracing::info!("Demo config: {:?}", config);

    let assets = AssetBank::load(&config.engine).context("Failed to load sound assets")?;

    let (platform_tx, platform_rx) = platform_events();
    let (device, mut offline): (Box<dyn OutputDevice>, Option<OfflineDriver>) = if args.offline {
        let format = HardwareFormat::new(args.channels, OFFLINE_SAMPLE_RATE);
        let (device, handle) = OfflineDevice::new(format);
        let driver = OfflineDriver::new(handle, config.tick_hz, args.record.as_ref())?;
        (Box::new(device), Some(driver))
    } else {
        let device = CpalDevice::new(Some(platform_tx.clone())).context("Failed to open audio output")?;
        (Box::new(device), None)
    };

    let (controller, observer) = AudioGraphController::new(config.engine.clone(), device, assets);
    let controller = Arc::new(controller);
    controller.start().context("Failed to start audio engine")?;
    tracing::info!(
        "Audio engine started: {:?}",
        controller.topology().map(|topology| topology.layout.name())
    );

    let pump = EventPump::spawn(Arc::clone(&controller), platform_rx)
        .context("Failed to spawn event pump")?;

    let scene = Arc::new(Mutex::new(Scene::new(config.scene.clone())));
    let seed = args.seed.or(config.seed).unwrap_or_else(rand::random);
    tracing::info!("Launch seed: {}", seed);
    let spawner = Spawner::spawn(
        Arc::clone(&controller),
        Arc::clone(&scene),
        SpawnerSettings {
            interval: Duration::from_secs_f32(config.spawn_interval_secs),
            launch_position: config.launch_position,
            max_balls: config.max_balls,
            announce_timeout: Duration::from_secs(1),
            seed,
        },
    )
    .context("Failed to spawn launcher")?;

    let tick = Duration::from_secs_f64(1.0 / f64::from(config.tick_hz));
    let dt = tick.as_secs_f32();
    let run_for = args.duration.map(Duration::from_secs_f32);
    let started = Instant::now();
    let mut next_tick = started;
    let mut collisions = Vec::new();

    loop {
        let elapsed = started.elapsed();
        if run_for.is_some_and(|limit| elapsed >= limit) {
            break;
        }
        if pump.is_finished() {
            tracing::error!("Event pump exited; stopping");
            break;
        }

        collisions.clear();
        scene.lock().step(dt, &mut collisions);
        for hit in collisions.iter().filter(|hit| is_audible_impulse(hit.impulse)) {
            match controller.trigger_collision(hit.entity, hit.point, hit.impulse) {
                Ok(()) => {}
                Err(EngineError::NotFound(entity)) => {
                    tracing::warn!("Collision for {} without a voice", entity);
                }
                Err(e) => return Err(e).context("Failed to play collision"),
            }
        }

        if config.sweep_degrees_per_sec != 0.0 {
            let yaw = (config.sweep_degrees_per_sec * elapsed.as_secs_f32()).rem_euclid(360.0);
            controller.update_listener_orientation(ListenerOrientation::new(yaw, 0.0, 0.0));
        }

        while let Ok(event) = observer.try_recv() {
            tracing::info!("Engine event: {:?}", event);
        }

        if let Some(driver) = offline.as_mut() {
            driver.tick()?;
        }

        next_tick += tick;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    tracing::info!("bounce3d shutting down ({} balls)", scene.lock().len());

    spawner.stop();
    drop(platform_tx);
    if let Err(e) = pump.stop() {
        tracing::error!("Event pump failed: {}", e);
    }
    controller.shutdown();

    if let Some(driver) = offline {
        driver.finish()?;
    }

    Ok(())
}

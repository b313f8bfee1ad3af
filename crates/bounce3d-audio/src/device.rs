//! Output devices - where rendered audio goes.
//!
//! `CpalDevice` plays through the system's default output. `OfflineDevice`
//! renders on demand, for tests and headless runs.

use crate::renderer::Renderer;
use anyhow::Context;
use bounce3d_comms::PlatformEvent;
use bounce3d_core::{ChannelCount, Sample, SampleRate, sample_rates};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// What the hardware output currently looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareFormat {
    pub channels: ChannelCount,
    pub sample_rate: SampleRate,
}

impl HardwareFormat {
    pub const fn new(channels: ChannelCount, sample_rate: SampleRate) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}

impl Default for HardwareFormat {
    fn default() -> Self {
        Self::new(2, sample_rates::SR_48000)
    }
}

/// Output device errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to query output format: {0}")]
    Format(String),

    #[error("Failed to start output stream: {0}")]
    StartFailed(String),

    #[error("Audio host thread is not running")]
    HostThreadGone,
}

/// A sink the controller can hand a renderer to.
///
/// `start` replaces any renderer that is already running.
pub trait OutputDevice: Send {
    /// Current hardware channel count and sample rate
    fn hardware_format(&self) -> Result<HardwareFormat, DeviceError>;

    /// Begin pulling audio from `renderer`
    fn start(&mut self, renderer: Renderer) -> Result<(), DeviceError>;

    /// Stop pulling audio and drop the renderer
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

enum HostCommand {
    Start {
        renderer: Renderer,
        reply: Sender<Result<(), DeviceError>>,
    },
    Stop {
        reply: Sender<()>,
    },
    Shutdown,
}

/// Default system output via cpal.
///
/// cpal streams cannot leave the thread that built them, so the stream lives
/// on a dedicated host thread driven over a channel.
pub struct CpalDevice {
    commands: Sender<HostCommand>,
    host_thread: Option<JoinHandle<()>>,
    running: bool,
}

impl CpalDevice {
    /// Spawn the host thread.
    ///
    /// Stream errors are reported on `events` as [`PlatformEvent::MediaReset`].
    pub fn new(events: Option<Sender<PlatformEvent>>) -> Result<Self, DeviceError> {
        let (commands, rx) = crossbeam_channel::unbounded();
        let host_thread = std::thread::Builder::new()
            .name("bounce3d-audio-host".into())
            .spawn(move || host_loop(&rx, events.as_ref()))
            .map_err(|_| DeviceError::HostThreadGone)?;

        Ok(Self {
            commands,
            host_thread: Some(host_thread),
            running: false,
        })
    }
}

impl OutputDevice for CpalDevice {
    fn hardware_format(&self) -> Result<HardwareFormat, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| DeviceError::Format(e.to_string()))?;

        Ok(HardwareFormat::new(
            usize::from(config.channels()),
            config.sample_rate().0,
        ))
    }

    fn start(&mut self, renderer: Renderer) -> Result<(), DeviceError> {
        let (reply, result) = crossbeam_channel::bounded(1);
        self.commands
            .send(HostCommand::Start { renderer, reply })
            .map_err(|_| DeviceError::HostThreadGone)?;
        result.recv().map_err(|_| DeviceError::HostThreadGone)??;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        let (reply, done) = crossbeam_channel::bounded(1);
        if self.commands.send(HostCommand::Stop { reply }).is_ok() {
            let _ = done.recv();
        }
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.stop();
        let _ = self.commands.send(HostCommand::Shutdown);
        if let Some(handle) = self.host_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Audio host thread panicked");
            }
        }
    }
}

fn host_loop(commands: &Receiver<HostCommand>, events: Option<&Sender<PlatformEvent>>) {
    let mut stream: Option<cpal::Stream> = None;

    for command in commands {
        match command {
            HostCommand::Start { renderer, reply } => {
                // Old stream goes first so only one renderer is ever live
                stream = None;
                let result = match open_stream(renderer, events.cloned()) {
                    Ok(opened) => {
                        stream = Some(opened);
                        Ok(())
                    }
                    Err(e) => Err(DeviceError::StartFailed(format!("{e:#}"))),
                };
                let _ = reply.send(result);
            }
            HostCommand::Stop { reply } => {
                if let Some(stream) = stream.take() {
                    if let Err(e) = stream.pause() {
                        tracing::warn!("Failed to pause output stream: {}", e);
                    }
                    tracing::info!("Audio stream stopped");
                }
                let _ = reply.send(());
            }
            HostCommand::Shutdown => break,
        }
    }
}

fn open_stream(
    mut renderer: Renderer,
    events: Option<Sender<PlatformEvent>>,
) -> anyhow::Result<cpal::Stream> {
    let host = cpal::default_host();
    tracing::debug!("Using audio host: {}", host.id().name());

    let device = host
        .default_output_device()
        .context("No output device available")?;
    tracing::info!("Using output device: {}", device.name()?);

    let supported = device
        .default_output_config()
        .context("No default output config")?;
    let config = cpal::StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::debug!("Stream config: {:?} ({})", config, renderer.topology().layout);

    let channels = usize::from(config.channels);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // REAL-TIME SAFE: the renderer neither allocates nor logs
                renderer.process(data, channels);
            },
            move |err| {
                tracing::error!("Audio stream error: {}", err);
                if let Some(events) = &events {
                    let _ = events.send(PlatformEvent::MediaReset);
                }
            },
            None,
        )
        .context("Failed to build output stream")?;

    stream.play().context("Failed to start output stream")?;
    tracing::info!("Audio stream started");
    Ok(stream)
}

#[derive(Default)]
struct OfflineState {
    format: HardwareFormat,
    renderer: Option<Renderer>,
    fail_next_start: bool,
    start_count: usize,
}

/// A device that renders only when asked to, through its [`OfflineHandle`]
pub struct OfflineDevice {
    state: Arc<Mutex<OfflineState>>,
}

/// Test/driver side of an [`OfflineDevice`]
#[derive(Clone)]
pub struct OfflineHandle {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineDevice {
    pub fn new(format: HardwareFormat) -> (Self, OfflineHandle) {
        let state = Arc::new(Mutex::new(OfflineState {
            format,
            ..OfflineState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            OfflineHandle { state },
        )
    }
}

impl OutputDevice for OfflineDevice {
    fn hardware_format(&self) -> Result<HardwareFormat, DeviceError> {
        Ok(self.state.lock().format)
    }

    fn start(&mut self, renderer: Renderer) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_start) {
            return Err(DeviceError::StartFailed("offline device refused to start".into()));
        }
        state.renderer = Some(renderer);
        state.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().renderer = None;
    }

    fn is_running(&self) -> bool {
        self.state.lock().renderer.is_some()
    }
}

impl OfflineHandle {
    /// Change what the "hardware" reports (simulates a route change)
    pub fn set_format(&self, format: HardwareFormat) {
        self.state.lock().format = format;
    }

    pub fn format(&self) -> HardwareFormat {
        self.state.lock().format
    }

    /// Make the next `start` fail
    pub fn fail_next_start(&self) {
        self.state.lock().fail_next_start = true;
    }

    /// How many times a renderer was started
    pub fn start_count(&self) -> usize {
        self.state.lock().start_count
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().renderer.is_some()
    }

    /// Pull `frames` interleaved frames; silence when stopped
    pub fn render(&self, frames: usize) -> Vec<Sample> {
        let mut state = self.state.lock();
        let channels = state.format.channels;
        let mut output = vec![0.0; frames * channels];
        if let Some(renderer) = state.renderer.as_mut() {
            renderer.process(&mut output, channels);
        }
        output
    }

    /// Same as [`render`](Self::render), into a caller-provided buffer
    pub fn render_into(&self, output: &mut [Sample]) {
        let mut state = self.state.lock();
        let channels = state.format.channels;
        match state.renderer.as_mut() {
            Some(renderer) => renderer.process(output, channels),
            None => output.fill(0.0),
        }
    }
}

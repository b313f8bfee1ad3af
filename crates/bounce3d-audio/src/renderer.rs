//! Real-time renderer.
//!
//! Lives on the audio thread. Everything it touches is allocated up front by
//! the controller; `process` only drains the command queue, reads the
//! listener pose and mixes.

use crate::assets::SampleBuffer;
use crate::reverb::EnvironmentReverb;
use crate::spatial::{SpeakerGains, distance_gain, relative_direction, speaker_gains};
use crate::topology::Topology;
use crate::voice::{VoiceId, VoiceParams};
use bounce3d_comms::{CommandReceiver, ListenerOutput, ScheduleNotifier};
use bounce3d_core::{ChannelCount, Frames, Sample};
use std::sync::Arc;

/// Commands sent from the controller to the audio thread
#[derive(Debug)]
pub enum RenderCommand {
    /// Start tracking a voice (silent until scheduled)
    AttachVoice { voice: VoiceId, params: VoiceParams },

    /// Stop tracking a voice
    DetachVoice(VoiceId),

    /// Play `buffer` from the start, cutting off whatever the voice was playing.
    ///
    /// `notifier` fires as soon as the command is taken off the queue.
    Schedule {
        voice: VoiceId,
        buffer: Arc<SampleBuffer>,
        params: VoiceParams,
        notifier: Option<ScheduleNotifier>,
    },

    Stop(VoiceId),

    StopAll,
}

struct VoiceSlot {
    id: VoiceId,
    params: VoiceParams,
    buffer: Option<Arc<SampleBuffer>>,
    /// Read position in source frames
    cursor: f64,
    playing: bool,
}

impl VoiceSlot {
    const fn new(id: VoiceId, params: VoiceParams) -> Self {
        Self {
            id,
            params,
            buffer: None,
            cursor: 0.0,
            playing: false,
        }
    }

    fn schedule(&mut self, buffer: Arc<SampleBuffer>, params: VoiceParams) {
        self.buffer = Some(buffer);
        self.params = params;
        self.cursor = 0.0;
        self.playing = true;
    }
}

/// Mixes every playing voice through the environment into interleaved output
pub struct Renderer {
    commands: CommandReceiver<RenderCommand>,
    listener: ListenerOutput,
    topology: Topology,
    voices: Vec<VoiceSlot>,
    max_voices: usize,
    announcer: VoiceSlot,
    reverb: EnvironmentReverb,
    /// Reverb send bus, one sample per frame
    send: Vec<Sample>,
    gains: SpeakerGains,
}

impl Renderer {
    /// Build a renderer for `topology`.
    ///
    /// `max_voices` slots and a `block_size` send bus are reserved here so
    /// the audio thread never allocates.
    pub fn new(
        topology: Topology,
        commands: CommandReceiver<RenderCommand>,
        listener: ListenerOutput,
        reverb: EnvironmentReverb,
        max_voices: usize,
        block_size: Frames,
    ) -> Self {
        Self {
            commands,
            listener,
            topology,
            voices: Vec::with_capacity(max_voices),
            max_voices,
            announcer: VoiceSlot::new(VoiceId::ANNOUNCER, VoiceParams::default()),
            reverb,
            send: vec![0.0; block_size.max(1)],
            gains: SpeakerGains::new(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Register a voice before the renderer is handed to a device
    pub fn attach_voice(&mut self, voice: VoiceId, params: VoiceParams) {
        self.handle_command(RenderCommand::AttachVoice { voice, params });
    }

    #[cfg(test)]
    fn is_playing(&self, voice: VoiceId) -> bool {
        self.slot(voice).is_some_and(|slot| slot.playing)
    }

    /// Number of tracked voices (announcer excluded)
    #[cfg(test)]
    fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Fill `output` (interleaved, `hardware_channels` wide).
    ///
    /// Channels beyond the topology's are left silent.
    pub fn process(&mut self, output: &mut [Sample], hardware_channels: ChannelCount) {
        while let Ok(command) = self.commands.pop() {
            self.handle_command(command);
        }

        output.fill(0.0);
        if hardware_channels == 0 {
            return;
        }

        let chunk_len = self.send.len() * hardware_channels;
        let usable = output.len() - output.len() % hardware_channels;
        for chunk in output[..usable].chunks_mut(chunk_len) {
            self.render_chunk(chunk, hardware_channels);
        }
    }

    fn render_chunk(&mut self, output: &mut [Sample], hardware_channels: ChannelCount) {
        let Self {
            listener,
            topology,
            voices,
            announcer,
            reverb,
            send,
            gains,
            ..
        } = self;

        let frames = output.len() / hardware_channels;
        let send = &mut send[..frames];
        send.fill(0.0);

        let pose = *listener.read();
        let output_rate = f64::from(topology.sample_rate.max(1));

        for slot in voices.iter_mut().chain(std::iter::once(announcer)) {
            if !slot.playing {
                continue;
            }
            let Some(buffer) = slot.buffer.as_deref() else {
                continue;
            };

            let direction = relative_direction(&pose, slot.params.position);
            speaker_gains(&direction, slot.params.algorithm, topology.layout, gains);
            let level = distance_gain(direction.distance) * slot.params.gain;
            let step = f64::from(slot.params.rate) * f64::from(buffer.sample_rate()) / output_rate;
            let end = buffer.len() as f64;

            for (frame, bus) in output.chunks_exact_mut(hardware_channels).zip(send.iter_mut()) {
                if slot.cursor >= end {
                    slot.playing = false;
                    break;
                }
                let sample = buffer.sample_at(slot.cursor) * level;
                for (out, gain) in frame.iter_mut().zip(gains.iter()) {
                    *out += sample * gain;
                }
                *bus += sample * slot.params.reverb_blend;
                slot.cursor += step;
            }
        }

        if !reverb.is_enabled() {
            return;
        }
        let wet_channels = topology.channels.min(hardware_channels).max(1);
        let spread = (wet_channels as f32).sqrt().recip();
        for (frame, &bus) in output.chunks_exact_mut(hardware_channels).zip(send.iter()) {
            let wet = reverb.process(bus) * spread;
            for out in &mut frame[..wet_channels] {
                *out += wet;
            }
        }
    }

    fn handle_command(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::AttachVoice { voice, params } => {
                if let Some(slot) = self.slot_mut(voice) {
                    slot.params = params;
                } else if self.voices.len() < self.max_voices {
                    self.voices.push(VoiceSlot::new(voice, params));
                }
                // Over capacity: the voice stays silent rather than allocate
            }
            RenderCommand::DetachVoice(voice) => {
                if let Some(index) = self.voices.iter().position(|slot| slot.id == voice) {
                    self.voices.swap_remove(index);
                }
            }
            RenderCommand::Schedule {
                voice,
                buffer,
                params,
                notifier,
            } => {
                // Unknown voice: the notifier is dropped and the waiter sees `false`
                if let Some(slot) = self.slot_mut(voice) {
                    slot.schedule(buffer, params);
                    if let Some(notifier) = notifier {
                        notifier.notify();
                    }
                }
            }
            RenderCommand::Stop(voice) => {
                if let Some(slot) = self.slot_mut(voice) {
                    slot.playing = false;
                }
            }
            RenderCommand::StopAll => {
                for slot in &mut self.voices {
                    slot.playing = false;
                }
                self.announcer.playing = false;
                self.reverb.reset();
            }
        }
    }

    #[cfg(test)]
    fn slot(&self, voice: VoiceId) -> Option<&VoiceSlot> {
        if voice == VoiceId::ANNOUNCER {
            Some(&self.announcer)
        } else {
            self.voices.iter().find(|slot| slot.id == voice)
        }
    }

    fn slot_mut(&mut self, voice: VoiceId) -> Option<&mut VoiceSlot> {
        if voice == VoiceId::ANNOUNCER {
            Some(&mut self.announcer)
        } else {
            self.voices.iter_mut().find(|slot| slot.id == voice)
        }
    }
}

//! Audio graph controller.
//!
//! Owns the mix graph, the voice pool and the output device, and is the
//! single place graph mutations happen. Every mutating operation takes the
//! same lock, so a rebuild triggered by a platform event can never run
//! concurrently with voice creation on the spawner thread.
//!
//! The listener pose sits behind its own lock and is published to the audio
//! thread through a triple buffer; pose updates never wait on a rebuild.

use crate::assets::AssetBank;
use crate::config::EngineConfig;
use crate::device::OutputDevice;
use crate::error::{EngineError, Result};
use crate::graph::{ConnectionFormat, MixGraph, NodeId, NodeKind};
use crate::impulse::{gain_for_impulse, playback_rate_for_impulse};
use crate::pool::{VoicePool, Wiring};
use crate::renderer::{RenderCommand, Renderer};
use crate::reverb::EnvironmentReverb;
use crate::topology::{MultichannelFlag, RenderingAlgorithm, Topology, select_topology};
use crate::voice::{VoiceId, VoiceParams, VoiceSnapshot};
use bounce3d_comms::{
    Announcement, CommandSender, EngineEvent, ListenerInput, ListenerOutput, ListenerPose,
    PlatformEvent, command_queue, engine_events, listener_channel, scheduled_signal,
};
use bounce3d_core::{EntityHandle, ListenerOrientation, Point3};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// `start` has not succeeded yet
    Uninitialized,
    /// Rendering
    Running,
    /// Interrupted; rendering stopped until the interruption ends
    Suspended,
    /// Graph is being torn down and rebuilt
    Rebuilding,
    /// Shut down, or a rebuild failed; terminal
    Stopped,
}

struct ListenerState {
    pose: ListenerPose,
    input: Option<ListenerInput>,
}

impl ListenerState {
    fn publish(&mut self) {
        if let Some(input) = self.input.as_mut() {
            input.write(self.pose);
        }
    }

    /// Start a fresh channel for a new renderer, seeded with the current pose
    fn reseed(&mut self) -> ListenerOutput {
        let (input, output) = listener_channel(self.pose);
        self.input = Some(input);
        output
    }
}

struct Inner {
    state: EngineState,
    /// A configuration change arrived while suspended
    pending_config_change: bool,
    device: Box<dyn OutputDevice>,
    graph: MixGraph,
    environment: Option<NodeId>,
    topology: Option<Topology>,
    pool: VoicePool,
    /// `None` whenever no renderer is running
    commands: Option<CommandSender<RenderCommand>>,
}

impl Inner {
    fn require_started(&self, operation: &'static str) -> Result<()> {
        match self.state {
            EngineState::Running | EngineState::Suspended | EngineState::Rebuilding => Ok(()),
            state @ (EngineState::Uninitialized | EngineState::Stopped) => {
                Err(EngineError::InvalidState { operation, state })
            }
        }
    }

    /// Queue a command for the renderer; dropped when nothing is rendering
    fn send(&mut self, command: RenderCommand) -> Result<()> {
        match self.commands.as_mut() {
            Some(commands) => commands
                .push(command)
                .map_err(|_| EngineError::CommandQueueFull),
            None => Ok(()),
        }
    }

    fn rendered_voices(&self) -> usize {
        self.pool.iter().filter(|voice| voice.is_rendered()).count()
    }

    /// Give free renderer slots to the oldest voices waiting for one
    fn promote_waiting_voices(&mut self, max_voices: usize) -> Result<()> {
        if self.commands.is_none() {
            return Ok(());
        }
        let mut rendered = self.rendered_voices();
        while rendered < max_voices {
            let Some((entity, id, params)) = self
                .pool
                .iter()
                .find(|voice| !voice.is_rendered())
                .and_then(|voice| Some((voice.entity()?, voice.id(), *voice.params())))
            else {
                break;
            };
            self.send(RenderCommand::AttachVoice { voice: id, params })?;
            if let Some(voice) = self.pool.get_mut(entity) {
                voice.set_rendered(true);
            }
            tracing::debug!("{} took a free renderer slot", id);
            rendered += 1;
        }
        Ok(())
    }

    fn stop_rendering(&mut self) {
        for voice in self.pool.iter_mut() {
            voice.stop();
        }
        // Best effort: the renderer is about to be dropped anyway
        let _ = self.send(RenderCommand::StopAll);
        self.commands = None;
        self.device.stop();
    }
}

/// The audio graph controller.
///
/// Share it between threads behind an `Arc`; every method takes `&self`.
pub struct AudioGraphController {
    config: EngineConfig,
    assets: AssetBank,
    multichannel: MultichannelFlag,
    inner: Mutex<Inner>,
    listener: Mutex<ListenerState>,
    events: Sender<EngineEvent>,
}

impl AudioGraphController {
    /// Create a controller rendering to `device`.
    ///
    /// Returns the receiving end of the observer channel alongside it.
    pub fn new(
        config: EngineConfig,
        device: Box<dyn OutputDevice>,
        assets: AssetBank,
    ) -> (Self, Receiver<EngineEvent>) {
        let (events, observer) = engine_events();
        let listener = ListenerState {
            pose: ListenerPose {
                position: config.listener_position,
                orientation: ListenerOrientation::default(),
            },
            input: None,
        };

        let controller = Self {
            config,
            assets,
            multichannel: MultichannelFlag::default(),
            inner: Mutex::new(Inner {
                state: EngineState::Uninitialized,
                pending_config_change: false,
                device,
                graph: MixGraph::new(),
                environment: None,
                topology: None,
                pool: VoicePool::new(),
                commands: None,
            }),
            listener: Mutex::new(listener),
            events,
        };
        (controller, observer)
    }

    /// Build the graph, select the topology and start rendering.
    ///
    /// A device failure is fatal and leaves the controller uninitialized.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Uninitialized {
            return Err(EngineError::InvalidState {
                operation: "start",
                state: inner.state,
            });
        }

        tracing::info!("Audio graph starting");
        if let Err(e) = self.rebuild_graph(&mut inner).and_then(|()| self.start_rendering(&mut inner)) {
            tracing::error!("Audio graph failed to start: {}", e);
            inner.device.stop();
            return Err(e);
        }

        inner.state = EngineState::Running;
        tracing::info!("Audio graph running");
        Ok(())
    }

    /// Stop every voice, stop the device and refuse further work
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.state == EngineState::Stopped {
            return;
        }
        tracing::info!("Audio graph shutting down ({} voices)", inner.pool.len());
        inner.stop_rendering();
        inner.pending_config_change = false;
        inner.state = EngineState::Stopped;
    }

    /// Allocate and connect a voice for `entity`
    pub fn create_voice(&self, entity: EntityHandle) -> Result<VoiceId> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.require_started("create a voice")?;

        let Some(environment) = inner.environment else {
            return Err(EngineError::InvalidState {
                operation: "create a voice",
                state: inner.state,
            });
        };
        let sample_rate = inner.topology.map_or(0, |t| t.sample_rate);
        let wiring = Wiring {
            environment,
            format: ConnectionFormat::mono(sample_rate),
            algorithm: self.multichannel.algorithm(),
        };

        let state = inner.state;
        let id = inner
            .pool
            .create_voice(entity, &mut inner.graph, wiring)
            .map_err(|e| EngineError::from_pool(e, state))?;

        let params = inner
            .pool
            .get(entity)
            .map(|voice| *voice.params())
            .unwrap_or_default();
        if inner.commands.is_none() {
            // Slots are handed out when rendering restarts
            return Ok(id);
        }
        if inner.rendered_voices() >= self.config.max_voices {
            tracing::warn!(
                "{} voices exceed the renderer's {} slots; {} stays silent until one frees up",
                inner.pool.len(),
                self.config.max_voices,
                id
            );
            return Ok(id);
        }

        if let Err(e) = inner.send(RenderCommand::AttachVoice { voice: id, params }) {
            let _ = inner.pool.destroy_voice(entity, &mut inner.graph);
            return Err(e);
        }
        if let Some(voice) = inner.pool.get_mut(entity) {
            voice.set_rendered(true);
        }
        Ok(id)
    }

    /// Stop, disconnect and remove the voice owned by `entity`
    pub fn destroy_voice(&self, entity: EntityHandle) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.require_started("destroy a voice")?;

        let (id, rendered) = inner
            .pool
            .get(entity)
            .map(|voice| (voice.id(), voice.is_rendered()))
            .ok_or(EngineError::NotFound(entity))?;
        if rendered {
            inner.send(RenderCommand::DetachVoice(id))?;
        }

        let state = inner.state;
        inner
            .pool
            .destroy_voice(entity, &mut inner.graph)
            .map_err(|e| EngineError::from_pool(e, state))?;

        if rendered {
            if let Err(e) = inner.promote_waiting_voices(self.config.max_voices) {
                tracing::warn!("Could not hand {}'s renderer slot to a waiting voice: {}", id, e);
            }
        }
        Ok(())
    }

    /// Play the collision sound on `entity`'s voice, cutting off any sound
    /// it is still playing. Does nothing unless running.
    pub fn trigger_collision(&self, entity: EntityHandle, position: Point3, impulse: f32) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.require_started("trigger a collision")?;

        let voice = inner.pool.get(entity).ok_or(EngineError::NotFound(entity))?;
        if inner.state != EngineState::Running {
            return Ok(());
        }

        let (gain, rate) = (gain_for_impulse(impulse), playback_rate_for_impulse(impulse));
        let id = voice.id();
        let params = VoiceParams {
            position,
            gain,
            rate,
            ..*voice.params()
        };

        // The voice only changes once the renderer has the command
        inner.send(RenderCommand::Schedule {
            voice: id,
            buffer: Arc::clone(&self.assets.collision),
            params,
            notifier: None,
        })?;
        if let Some(voice) = inner.pool.get_mut(entity) {
            voice.trigger(position, gain, rate);
        }
        Ok(())
    }

    /// Schedule the launch sound at `position`.
    ///
    /// Returns `None` while suspended. The announcement resolves once the
    /// render thread has taken the buffer, not when it finishes playing.
    pub fn announce(&self, position: Point3) -> Result<Option<Announcement>> {
        let mut inner = self.inner.lock();
        inner.require_started("announce")?;
        if inner.state != EngineState::Running {
            return Ok(None);
        }

        let params = VoiceParams {
            position,
            gain: self.config.launch_volume,
            rate: 1.0,
            algorithm: RenderingAlgorithm::EqualPowerPanning,
            reverb_blend: 0.0,
        };
        let (notifier, announcement) = scheduled_signal();
        inner.send(RenderCommand::Schedule {
            voice: VoiceId::ANNOUNCER,
            buffer: Arc::clone(&self.assets.launch),
            params,
            notifier: Some(notifier),
        })?;
        Ok(Some(announcement))
    }

    pub fn update_listener_position(&self, position: Point3) {
        let mut listener = self.listener.lock();
        listener.pose.position = position;
        listener.publish();
    }

    pub fn update_listener_orientation(&self, orientation: ListenerOrientation) {
        let mut listener = self.listener.lock();
        listener.pose.orientation = orientation;
        listener.publish();
    }

    pub fn listener_pose(&self) -> ListenerPose {
        self.listener.lock().pose
    }

    /// The output device or route changed.
    ///
    /// While suspended the rebuild is deferred until the interruption ends;
    /// repeated changes collapse into one.
    pub fn on_output_configuration_changed(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            EngineState::Suspended => {
                tracing::debug!("Output configuration changed while suspended; deferring rebuild");
                inner.pending_config_change = true;
                Ok(())
            }
            EngineState::Running => {
                tracing::info!("Output configuration changed; rebuilding graph");
                self.rebuild(&mut inner)?;
                self.notify(EngineEvent::ConfigurationChanged);
                Ok(())
            }
            state => {
                tracing::debug!("Ignoring configuration change while {:?}", state);
                Ok(())
            }
        }
    }

    /// Session interruption began (`true`) or ended (`false`)
    pub fn on_session_interrupted(&self, began: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        match (began, inner.state) {
            (true, EngineState::Running) => {
                inner.stop_rendering();
                inner.state = EngineState::Suspended;
                tracing::info!("Audio session interrupted");
                self.notify(EngineEvent::Interrupted);
                Ok(())
            }
            (false, EngineState::Suspended) => {
                if std::mem::take(&mut inner.pending_config_change) {
                    tracing::info!("Interruption ended; applying deferred configuration change");
                    self.rebuild(&mut inner)?;
                    self.notify(EngineEvent::ConfigurationChanged);
                } else {
                    tracing::info!("Interruption ended; restarting");
                    inner.state = EngineState::Rebuilding;
                    if let Err(e) = self.start_rendering(&mut inner) {
                        inner.state = EngineState::Stopped;
                        return Err(e);
                    }
                    inner.state = EngineState::Running;
                }
                self.notify(EngineEvent::Restarted);
                Ok(())
            }
            (began, state) => {
                tracing::debug!("Ignoring interruption (began: {}) while {:?}", began, state);
                Ok(())
            }
        }
    }

    /// Serialization point for platform events
    pub fn handle_event(&self, event: PlatformEvent) -> Result<()> {
        tracing::debug!("Platform event: {:?}", event);
        match event {
            PlatformEvent::ConfigChanged => self.on_output_configuration_changed(),
            PlatformEvent::InterruptionBegan => self.on_session_interrupted(true),
            PlatformEvent::InterruptionEnded => self.on_session_interrupted(false),
            PlatformEvent::MediaReset => self.on_media_reset(),
        }
    }

    fn on_media_reset(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let was_suspended = match inner.state {
            EngineState::Running => false,
            EngineState::Suspended => true,
            state => {
                tracing::debug!("Ignoring media reset while {:?}", state);
                return Ok(());
            }
        };

        tracing::warn!("Media services reset; rebuilding graph");
        inner.pending_config_change = false;
        self.rebuild(&mut inner)?;
        self.notify(EngineEvent::ConfigurationChanged);
        if was_suspended {
            self.notify(EngineEvent::Restarted);
        }
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Topology selected by the last (re)build
    pub fn topology(&self) -> Option<Topology> {
        self.inner.lock().topology
    }

    pub fn multichannel_enabled(&self) -> bool {
        self.multichannel.is_enabled()
    }

    pub fn has_pending_configuration_change(&self) -> bool {
        self.inner.lock().pending_config_change
    }

    pub fn voice_count(&self) -> usize {
        self.inner.lock().pool.len()
    }

    pub fn voice_snapshot(&self, entity: EntityHandle) -> Option<VoiceSnapshot> {
        self.inner.lock().pool.get(entity).map(|voice| voice.snapshot())
    }

    /// Live connections in the mix graph
    pub fn connection_count(&self) -> usize {
        self.inner.lock().graph.connection_count()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn notify(&self, event: EngineEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Full rebuild: reselect topology, rewire, restart rendering.
    ///
    /// Failure is fatal and leaves the controller stopped.
    fn rebuild(&self, inner: &mut Inner) -> Result<()> {
        inner.state = EngineState::Rebuilding;
        let result = self
            .rebuild_graph(inner)
            .and_then(|()| self.start_rendering(inner));

        match result {
            Ok(()) => {
                inner.state = EngineState::Running;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Graph rebuild failed: {}", e);
                inner.stop_rendering();
                inner.state = EngineState::Stopped;
                Err(e)
            }
        }
    }

    /// Build a fresh graph against the current hardware and reconnect every voice
    fn rebuild_graph(&self, inner: &mut Inner) -> Result<()> {
        let format = inner.device.hardware_format()?;
        let topology = select_topology(format.channels, format.sample_rate);
        self.multichannel.apply(&topology);

        let mut graph = MixGraph::new();
        let output = graph.output();
        let environment = graph.attach(NodeKind::Environment);
        graph.connect(
            environment,
            output,
            ConnectionFormat {
                channels: topology.channels,
                sample_rate: topology.sample_rate,
            },
        )?;

        let source_format = ConnectionFormat::mono(topology.sample_rate);
        let announcer = graph.attach(NodeKind::Announcer);
        graph.connect(announcer, environment, source_format)?;

        inner.pool.reconnect_all(
            &mut graph,
            Wiring {
                environment,
                format: source_format,
                algorithm: topology.algorithm,
            },
        )?;

        inner.graph = graph;
        inner.environment = Some(environment);
        inner.topology = Some(topology);

        tracing::info!(
            "Output topology: {} ({} channels @ {}Hz, {:?}), {} voices",
            topology.layout,
            topology.channels,
            topology.sample_rate,
            topology.algorithm,
            inner.pool.len()
        );
        Ok(())
    }

    /// Hand the device a new renderer mirroring the current graph
    fn start_rendering(&self, inner: &mut Inner) -> Result<()> {
        let Some(topology) = inner.topology else {
            return Err(EngineError::InvalidState {
                operation: "start rendering",
                state: inner.state,
            });
        };

        let (commands, receiver) = command_queue(self.config.command_queue_capacity);
        let listener = self.listener.lock().reseed();
        let reverb = if self.config.reverb.enabled {
            EnvironmentReverb::new(
                self.config.reverb.preset,
                self.config.reverb.level_db,
                topology.sample_rate,
            )
        } else {
            EnvironmentReverb::disabled(topology.sample_rate)
        };

        let mut renderer = Renderer::new(
            topology,
            receiver,
            listener,
            reverb,
            self.config.max_voices,
            self.config.block_size,
        );
        // A fresh renderer is silent; the oldest voices get its slots
        for (index, voice) in inner.pool.iter_mut().enumerate() {
            voice.stop();
            let rendered = index < self.config.max_voices;
            if rendered {
                renderer.attach_voice(voice.id(), *voice.params());
            }
            voice.set_rendered(rendered);
        }

        inner.commands = None;
        inner.device.stop();
        inner.device.start(renderer)?;
        inner.commands = Some(commands);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SampleBuffer;
    use crate::device::{HardwareFormat, OfflineDevice, OfflineHandle};
    use crate::voice::VoiceState;

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.reverb.enabled = false;
        config
    }

    fn test_assets() -> AssetBank {
        AssetBank::from_buffers(
            SampleBuffer::new(vec![0.5; 4800], 48000),
            SampleBuffer::new(vec![0.25; 2400], 48000),
        )
    }

    fn controller_with(format: HardwareFormat) -> (AudioGraphController, OfflineHandle, Receiver<EngineEvent>) {
        configured(test_config(), format)
    }

    fn configured(
        config: EngineConfig,
        format: HardwareFormat,
    ) -> (AudioGraphController, OfflineHandle, Receiver<EngineEvent>) {
        let (device, handle) = OfflineDevice::new(format);
        let (controller, events) = AudioGraphController::new(config, Box::new(device), test_assets());
        (controller, handle, events)
    }

    fn started() -> (AudioGraphController, OfflineHandle, Receiver<EngineEvent>) {
        let (controller, handle, events) = controller_with(HardwareFormat::new(2, 48000));
        controller.start().unwrap();
        (controller, handle, events)
    }

    fn drain(events: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
        events.try_iter().collect()
    }

    #[test]
    fn test_operations_before_start_are_invalid() {
        let (controller, _handle, _events) = controller_with(HardwareFormat::default());
        assert_eq!(controller.state(), EngineState::Uninitialized);

        assert!(matches!(
            controller.create_voice(EntityHandle(1)),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            controller.announce(Point3::ORIGIN),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            controller.trigger_collision(EntityHandle(1), Point3::ORIGIN, 5.0),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_start_with_failing_device_is_fatal() {
        let (controller, handle, _events) = controller_with(HardwareFormat::default());
        handle.fail_next_start();

        let err = controller.start().unwrap_err();
        assert!(matches!(err, EngineError::DeviceUnavailable(_)));
        assert!(err.is_fatal());
        assert_eq!(controller.state(), EngineState::Uninitialized);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_start_builds_graph() {
        let (controller, handle, _events) = started();
        assert!(controller.is_running());
        assert!(handle.is_running());
        assert_eq!(controller.topology(), Some(Topology::stereo(48000)));
        assert!(!controller.multichannel_enabled());
        // environment -> output, announcer -> environment
        assert_eq!(controller.connection_count(), 2);

        assert!(matches!(
            controller.start(),
            Err(EngineError::InvalidState { operation: "start", .. })
        ));
    }

    #[test]
    fn test_create_destroy_hundred_voices() {
        let (controller, _handle, _events) = started();
        for i in 0..100 {
            controller.create_voice(EntityHandle(i)).unwrap();
        }
        assert_eq!(controller.voice_count(), 100);
        assert_eq!(controller.connection_count(), 102);

        for i in 0..100 {
            controller.destroy_voice(EntityHandle(i)).unwrap();
        }
        assert_eq!(controller.voice_count(), 0);
        assert_eq!(controller.connection_count(), 2);
    }

    #[test]
    fn test_voice_gets_reverb_blend_and_algorithm() {
        let (controller, _handle, _events) = started();
        controller.create_voice(EntityHandle(7)).unwrap();
        let snapshot = controller.voice_snapshot(EntityHandle(7)).unwrap();
        assert_eq!(snapshot.params.reverb_blend, 0.3);
        assert_eq!(snapshot.params.algorithm, RenderingAlgorithm::EqualPowerPanning);
        assert_eq!(snapshot.state, VoiceState::Attached);
    }

    #[test]
    fn test_duplicate_and_unknown_handles() {
        let (controller, _handle, _events) = started();
        controller.create_voice(EntityHandle(1)).unwrap();

        assert!(matches!(
            controller.create_voice(EntityHandle(1)),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            controller.destroy_voice(EntityHandle(2)),
            Err(EngineError::NotFound(EntityHandle(2)))
        ));
        assert!(matches!(
            controller.trigger_collision(EntityHandle(2), Point3::ORIGIN, 1.0),
            Err(EngineError::NotFound(EntityHandle(2)))
        ));
    }

    #[test]
    fn test_trigger_collision_maps_impulse() {
        let (controller, handle, _events) = started();
        controller.create_voice(EntityHandle(1)).unwrap();

        controller
            .trigger_collision(EntityHandle(1), Point3::new(1.0, 0.0, -1.0), 3.0)
            .unwrap();
        controller
            .trigger_collision(EntityHandle(1), Point3::new(-1.0, 0.0, -1.0), 12.0)
            .unwrap();

        let snapshot = controller.voice_snapshot(EntityHandle(1)).unwrap();
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.state, VoiceState::Playing);
        assert_eq!(snapshot.params.position, Point3::new(-1.0, 0.0, -1.0));
        assert_eq!(snapshot.params.gain, gain_for_impulse(12.0));
        assert_eq!(snapshot.params.rate, playback_rate_for_impulse(12.0));

        let out = handle.render(128);
        assert!(out.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_full_queue_leaves_voice_untouched() {
        let mut config = test_config();
        config.command_queue_capacity = 2;
        let (controller, _handle, _events) = configured(config, HardwareFormat::new(2, 48000));
        controller.start().unwrap();

        // Attach + one schedule fill the queue; nothing renders in between
        controller.create_voice(EntityHandle(1)).unwrap();
        controller
            .trigger_collision(EntityHandle(1), Point3::new(1.0, 0.0, 0.0), 3.0)
            .unwrap();

        let err = controller
            .trigger_collision(EntityHandle(1), Point3::new(-5.0, 0.0, 0.0), 12.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::CommandQueueFull));

        let snapshot = controller.voice_snapshot(EntityHandle(1)).unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.params.position, Point3::new(1.0, 0.0, 0.0));
        assert_eq!(snapshot.params.gain, gain_for_impulse(3.0));
    }

    #[test]
    fn test_waiting_voice_takes_freed_renderer_slot() {
        let mut config = test_config();
        config.max_voices = 2;
        let (controller, handle, _events) = configured(config, HardwareFormat::new(2, 48000));
        controller.start().unwrap();
        for i in 0..3 {
            controller.create_voice(EntityHandle(i)).unwrap();
        }

        // Third voice has no slot yet
        controller
            .trigger_collision(EntityHandle(2), Point3::new(1.0, 0.0, -1.0), 12.0)
            .unwrap();
        assert!(handle.render(64).iter().all(|s| *s == 0.0));

        controller.destroy_voice(EntityHandle(0)).unwrap();
        controller
            .trigger_collision(EntityHandle(2), Point3::new(1.0, 0.0, -1.0), 12.0)
            .unwrap();
        assert!(handle.render(64).iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_restart_gives_slots_to_oldest_voices() {
        let mut config = test_config();
        config.max_voices = 1;
        let (controller, handle, _events) = configured(config, HardwareFormat::new(2, 48000));
        controller.start().unwrap();
        controller.on_session_interrupted(true).unwrap();
        controller.create_voice(EntityHandle(1)).unwrap();
        controller.create_voice(EntityHandle(2)).unwrap();
        controller.on_session_interrupted(false).unwrap();

        controller
            .trigger_collision(EntityHandle(2), Point3::new(1.0, 0.0, -1.0), 12.0)
            .unwrap();
        assert!(handle.render(64).iter().all(|s| *s == 0.0));

        controller
            .trigger_collision(EntityHandle(1), Point3::new(1.0, 0.0, -1.0), 12.0)
            .unwrap();
        assert!(handle.render(64).iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_announcement_resolves_after_render() {
        let (controller, handle, _events) = started();
        let announcement = controller.announce(Point3::new(0.0, 0.0, -1.0)).unwrap().unwrap();
        assert!(!announcement.is_scheduled());

        handle.render(64);
        assert!(announcement.is_scheduled());
    }

    #[test]
    fn test_interruption_stops_voices_then_notifies() {
        let (controller, handle, events) = started();
        controller.create_voice(EntityHandle(1)).unwrap();
        controller.trigger_collision(EntityHandle(1), Point3::ORIGIN, 6.0).unwrap();

        controller.on_session_interrupted(true).unwrap();
        assert_eq!(controller.state(), EngineState::Suspended);
        assert_eq!(
            controller.voice_snapshot(EntityHandle(1)).unwrap().state,
            VoiceState::Stopped
        );
        assert!(!handle.is_running());
        assert_eq!(drain(&events), vec![EngineEvent::Interrupted]);

        // Suspended: no-ops, but voices can still be managed
        assert!(controller.announce(Point3::ORIGIN).unwrap().is_none());
        controller.trigger_collision(EntityHandle(1), Point3::ORIGIN, 6.0).unwrap();
        assert_eq!(controller.voice_snapshot(EntityHandle(1)).unwrap().generation, 1);
        controller.create_voice(EntityHandle(2)).unwrap();

        controller.on_session_interrupted(false).unwrap();
        assert!(controller.is_running());
        assert!(handle.is_running());
        assert_eq!(drain(&events), vec![EngineEvent::Restarted]);
        assert_eq!(controller.voice_count(), 2);
    }

    #[test]
    fn test_config_change_while_suspended_applied_once_after_interruption() {
        let (controller, handle, events) = started();
        controller.create_voice(EntityHandle(1)).unwrap();
        controller.on_session_interrupted(true).unwrap();
        drain(&events);
        let starts = handle.start_count();

        handle.set_format(HardwareFormat::new(6, 48000));
        controller.on_output_configuration_changed().unwrap();
        controller.handle_event(PlatformEvent::ConfigChanged).unwrap();

        // Deferred: nothing rebuilt yet
        assert!(controller.has_pending_configuration_change());
        assert_eq!(controller.topology(), Some(Topology::stereo(48000)));
        assert_eq!(handle.start_count(), starts);
        assert!(drain(&events).is_empty());

        controller.handle_event(PlatformEvent::InterruptionEnded).unwrap();
        assert_eq!(handle.start_count(), starts + 1);
        assert!(!controller.has_pending_configuration_change());
        let topology = controller.topology().unwrap();
        assert_eq!(topology.layout.name(), "AudioUnit_6_0");
        assert!(controller.multichannel_enabled());
        assert_eq!(
            drain(&events),
            vec![EngineEvent::ConfigurationChanged, EngineEvent::Restarted]
        );
        assert_eq!(
            controller.voice_snapshot(EntityHandle(1)).unwrap().params.algorithm,
            RenderingAlgorithm::SoundField
        );

        // A second "ended" does not rebuild again
        controller.on_session_interrupted(false).unwrap();
        assert_eq!(handle.start_count(), starts + 1);
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_rebuild_preserves_voice_state() {
        let (controller, handle, events) = started();
        for i in 0..10 {
            controller.create_voice(EntityHandle(i)).unwrap();
            controller
                .trigger_collision(EntityHandle(i), Point3::new(i as f32, 0.5, -3.0), i as f32)
                .unwrap();
        }
        let before: Vec<_> = (0..10)
            .map(|i| controller.voice_snapshot(EntityHandle(i)).unwrap().params)
            .collect();

        handle.set_format(HardwareFormat::new(8, 44100));
        controller.on_output_configuration_changed().unwrap();
        assert_eq!(drain(&events), vec![EngineEvent::ConfigurationChanged]);
        assert_eq!(controller.connection_count(), 12);

        for (i, old) in before.iter().enumerate() {
            let snapshot = controller.voice_snapshot(EntityHandle(i as u64)).unwrap();
            // The new renderer is silent until the next collision
            assert_eq!(snapshot.state, VoiceState::Stopped);
            let params = snapshot.params;
            assert_eq!(params.position, old.position);
            assert_eq!(params.gain, old.gain);
            assert_eq!(params.rate, old.rate);
            assert_eq!(params.reverb_blend, old.reverb_blend);
            assert_eq!(params.algorithm, RenderingAlgorithm::SoundField);
        }

        // New voices pick up the new algorithm
        controller.create_voice(EntityHandle(99)).unwrap();
        assert_eq!(
            controller.voice_snapshot(EntityHandle(99)).unwrap().params.algorithm,
            RenderingAlgorithm::SoundField
        );
        assert_eq!(handle.render(16).len(), 16 * 8);
    }

    #[test]
    fn test_failed_rebuild_stops_controller() {
        let (controller, handle, events) = started();
        handle.fail_next_start();
        let err = controller.on_output_configuration_changed().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(controller.state(), EngineState::Stopped);
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn test_media_reset_clears_interruption() {
        let (controller, handle, events) = started();
        controller.on_session_interrupted(true).unwrap();
        controller.on_output_configuration_changed().unwrap();
        drain(&events);

        controller.handle_event(PlatformEvent::MediaReset).unwrap();
        assert!(controller.is_running());
        assert!(handle.is_running());
        assert!(!controller.has_pending_configuration_change());
        assert_eq!(
            drain(&events),
            vec![EngineEvent::ConfigurationChanged, EngineEvent::Restarted]
        );
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let (controller, handle, _events) = started();
        controller.create_voice(EntityHandle(1)).unwrap();

        controller.shutdown();
        assert_eq!(controller.state(), EngineState::Stopped);
        assert!(!handle.is_running());
        assert!(matches!(
            controller.create_voice(EntityHandle(2)),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            controller.announce(Point3::ORIGIN),
            Err(EngineError::InvalidState { .. })
        ));
        // Platform events after shutdown are ignored
        controller.handle_event(PlatformEvent::ConfigChanged).unwrap();
        controller.shutdown();
        assert_eq!(controller.state(), EngineState::Stopped);
    }

    #[test]
    fn test_listener_updates_reach_renderer() {
        let (controller, handle, _events) = started();
        controller.update_listener_position(Point3::ORIGIN);
        controller.create_voice(EntityHandle(1)).unwrap();
        controller
            .trigger_collision(EntityHandle(1), Point3::new(2.0, 0.0, 0.0), 12.0)
            .unwrap();

        let out = handle.render(32);
        assert!(out[1] > out[0]);

        controller.update_listener_orientation(ListenerOrientation::new(90.0, 0.0, 0.0));
        let out = handle.render(32);
        assert!((out[0] - out[1]).abs() < 1e-4);
        assert_eq!(controller.listener_pose().orientation.yaw, 90.0);
    }

    #[test]
    fn test_listener_pose_survives_rebuild() {
        let (controller, handle, _events) = started();
        controller.update_listener_orientation(ListenerOrientation::new(30.0, 10.0, 0.0));
        handle.set_format(HardwareFormat::new(4, 48000));
        controller.on_output_configuration_changed().unwrap();
        assert_eq!(controller.listener_pose().orientation.yaw, 30.0);
        assert_eq!(controller.listener_pose().position, Point3::new(0.0, -2.0, 2.5));
    }

    #[test]
    fn test_controller_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AudioGraphController>();

        let (controller, _handle, _events) = started();
        let controller = Arc::new(controller);
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let entity = EntityHandle(t * 100 + i);
                        controller.create_voice(entity).unwrap();
                        controller.trigger_collision(entity, Point3::ORIGIN, 2.0).unwrap();
                    }
                })
            })
            .collect();
        controller.on_output_configuration_changed().unwrap();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(controller.voice_count(), 100);
        assert_eq!(controller.connection_count(), 102);
    }
}

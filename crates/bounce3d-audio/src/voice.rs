//! Per-entity playback voices.

use crate::graph::NodeId;
use crate::topology::RenderingAlgorithm;
use bounce3d_core::{EntityHandle, Point3};
use std::fmt;

/// Reverb send level every collision voice gets
pub const DEFAULT_REVERB_BLEND: f32 = 0.3;

/// Stable voice identifier (never reused within a controller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl VoiceId {
    /// The one-shot launch voice; pool ids never reach it
    pub const ANNOUNCER: Self = Self(u64::MAX);
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ANNOUNCER {
            f.write_str("announcer")
        } else {
            write!(f, "voice#{}", self.0)
        }
    }
}

/// Voice lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Allocated, not yet in the graph
    Idle,
    /// Connected to the environment, nothing scheduled
    Attached,
    /// A buffer was scheduled and started
    Playing,
    /// Playback was stopped (interruption, teardown)
    Stopped,
    /// Removed from the graph; about to be dropped
    Detached,
}

/// Everything the renderer needs to place a voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub position: Point3,
    pub gain: f32,
    pub rate: f32,
    pub algorithm: RenderingAlgorithm,
    pub reverb_blend: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            position: Point3::ORIGIN,
            gain: 1.0,
            rate: 1.0,
            algorithm: RenderingAlgorithm::EqualPowerPanning,
            reverb_blend: 0.0,
        }
    }
}

/// Read-only view of a voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSnapshot {
    pub id: VoiceId,
    pub entity: Option<EntityHandle>,
    pub params: VoiceParams,
    pub state: VoiceState,
    pub generation: u64,
}

/// One schedulable sound source
#[derive(Debug)]
pub struct Voice {
    id: VoiceId,
    entity: Option<EntityHandle>,
    node: Option<NodeId>,
    params: VoiceParams,
    state: VoiceState,
    /// Bumped on every schedule
    generation: u64,
    /// Holds a slot in the running renderer
    rendered: bool,
}

impl Voice {
    pub fn new(id: VoiceId, entity: Option<EntityHandle>) -> Self {
        Self {
            id,
            entity,
            node: None,
            params: VoiceParams::default(),
            state: VoiceState::Idle,
            generation: 0,
            rendered: false,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn entity(&self) -> Option<EntityHandle> {
        self.entity
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn params(&self) -> &VoiceParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut VoiceParams {
        &mut self.params
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn set_rendered(&mut self, rendered: bool) {
        self.rendered = rendered;
    }

    /// Record the graph node this voice is connected through
    pub fn attach(&mut self, node: NodeId, algorithm: RenderingAlgorithm) {
        self.node = Some(node);
        self.params.algorithm = algorithm;
        if matches!(self.state, VoiceState::Idle | VoiceState::Detached) {
            self.state = VoiceState::Attached;
        }
    }

    /// Schedule a new buffer, superseding whatever was playing.
    ///
    /// Returns the generation of the new schedule.
    pub fn trigger(&mut self, position: Point3, gain: f32, rate: f32) -> u64 {
        self.params.position = position;
        self.params.gain = gain;
        self.params.rate = rate;
        self.generation += 1;
        self.state = VoiceState::Playing;
        self.generation
    }

    pub fn stop(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Stopped;
        }
    }

    pub fn detach(&mut self) -> Option<NodeId> {
        self.stop();
        self.rendered = false;
        self.state = VoiceState::Detached;
        self.node.take()
    }

    pub fn snapshot(&self) -> VoiceSnapshot {
        VoiceSnapshot {
            id: self.id,
            entity: self.entity,
            params: self.params,
            state: self.state,
            generation: self.generation,
        }
    }
}

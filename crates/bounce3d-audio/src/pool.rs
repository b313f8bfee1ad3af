//! Voice pool: entity handle → voice, in creation order.
//!
//! The pool keeps the mix graph in step with its voices: a voice is connected
//! to the environment for as long as it is in the pool, and leaves no
//! connection behind when removed.

use crate::graph::{ConnectionFormat, GraphError, MixGraph, NodeId, NodeKind};
use crate::topology::RenderingAlgorithm;
use crate::voice::{DEFAULT_REVERB_BLEND, Voice, VoiceId};
use bounce3d_core::EntityHandle;
use std::collections::{BTreeMap, HashMap};

/// Voice pool errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("{0} already has a voice")]
    Duplicate(EntityHandle),

    #[error("{0} has no voice")]
    NotFound(EntityHandle),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Where voices get connected to
#[derive(Debug, Clone, Copy)]
pub struct Wiring {
    pub environment: NodeId,
    pub format: ConnectionFormat,
    pub algorithm: RenderingAlgorithm,
}

#[derive(Debug, Default)]
pub struct VoicePool {
    /// `VoiceId`s are monotonic, so this iterates in insertion order
    voices: BTreeMap<VoiceId, Voice>,
    by_entity: HashMap<EntityHandle, VoiceId>,
    next_id: u64,
}

impl VoicePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a voice for `entity` and connect it into `graph`
    pub fn create_voice(
        &mut self,
        entity: EntityHandle,
        graph: &mut MixGraph,
        wiring: Wiring,
    ) -> Result<VoiceId, PoolError> {
        if self.by_entity.contains_key(&entity) {
            return Err(PoolError::Duplicate(entity));
        }

        let id = VoiceId(self.next_id);
        let mut voice = Voice::new(id, Some(entity));

        let node = graph.attach(NodeKind::Player(id));
        if let Err(e) = graph.connect(node, wiring.environment, wiring.format) {
            graph.detach(node);
            return Err(e.into());
        }
        voice.attach(node, wiring.algorithm);
        voice.params_mut().reverb_blend = DEFAULT_REVERB_BLEND;

        self.next_id += 1;
        self.voices.insert(id, voice);
        self.by_entity.insert(entity, id);

        tracing::debug!("Created {} for {} (node {})", id, entity, node);
        Ok(id)
    }

    /// Stop, disconnect and remove the voice owned by `entity`
    pub fn destroy_voice(
        &mut self,
        entity: EntityHandle,
        graph: &mut MixGraph,
    ) -> Result<Voice, PoolError> {
        let id = self
            .by_entity
            .remove(&entity)
            .ok_or(PoolError::NotFound(entity))?;
        let mut voice = self
            .voices
            .remove(&id)
            .ok_or(PoolError::NotFound(entity))?;

        if let Some(node) = voice.detach() {
            graph.disconnect_node_output(node);
            graph.detach(node);
        }

        tracing::debug!("Destroyed {} for {}", id, entity);
        Ok(voice)
    }

    /// Re-register every voice against `graph` with the new wiring.
    ///
    /// Voices whose node is missing from `graph` (a freshly built graph) get
    /// a new node. Position, gain, rate and reverb blend are left untouched.
    pub fn reconnect_all(&mut self, graph: &mut MixGraph, wiring: Wiring) -> Result<(), GraphError> {
        for voice in self.voices.values_mut() {
            let expected = NodeKind::Player(voice.id());
            let node = match voice.node() {
                Some(node) if graph.kind(node) == Some(expected) => node,
                _ => graph.attach(expected),
            };
            graph.connect(node, wiring.environment, wiring.format)?;
            voice.attach(node, wiring.algorithm);
        }

        tracing::debug!(
            "Reconnected {} voices ({:?})",
            self.voices.len(),
            wiring.algorithm
        );
        Ok(())
    }

    pub fn get(&self, entity: EntityHandle) -> Option<&Voice> {
        self.by_entity.get(&entity).and_then(|id| self.voices.get(id))
    }

    pub fn get_mut(&mut self, entity: EntityHandle) -> Option<&mut Voice> {
        let id = self.by_entity.get(&entity)?;
        self.voices.get_mut(id)
    }

    /// Voices in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.values_mut()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

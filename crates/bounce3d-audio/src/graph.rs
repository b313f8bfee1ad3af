//! Mix graph bookkeeping.
//!
//! Tracks which nodes are attached and how they are connected. The graph is a
//! star: players and the announcer feed the environment node, which feeds the
//! hardware output. It is the controller's source of truth for "every voice is
//! connected" and "no connection outlives its voice".

use crate::voice::VoiceId;
use bounce3d_core::{ChannelCount, SampleRate};
use std::collections::HashMap;

/// Node identifier within a graph
pub type NodeId = usize;

/// What a node is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Hardware output
    Output,
    /// 3D mixing/environment node
    Environment,
    /// One-shot launch voice
    Announcer,
    /// Per-entity collision voice
    Player(VoiceId),
}

/// Stream format carried by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionFormat {
    pub channels: ChannelCount,
    pub sample_rate: SampleRate,
}

impl ConnectionFormat {
    /// Mono at the given rate (what the environment expects from sources)
    pub fn mono(sample_rate: SampleRate) -> Self {
        Self {
            channels: 1,
            sample_rate,
        }
    }
}

/// Connection between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
}

/// Graph errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Node {0} cannot be connected to itself")]
    SelfConnection(NodeId),
}

/// Node/connection registry for one audio graph
#[derive(Debug)]
pub struct MixGraph {
    nodes: HashMap<NodeId, NodeKind>,
    connections: HashMap<Connection, ConnectionFormat>,
    output: NodeId,
    next_id: NodeId,
}

impl Default for MixGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MixGraph {
    /// Create a graph containing only the hardware output node
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: HashMap::new(),
            connections: HashMap::new(),
            output: 0,
            next_id: 0,
        };
        graph.output = graph.attach(NodeKind::Output);
        graph
    }

    /// The hardware output node
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Attach a node (unconnected)
    pub fn attach(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, kind);
        tracing::trace!("Attached node {} ({:?})", id, kind);
        id
    }

    /// Detach a node, removing every connection involving it
    pub fn detach(&mut self, id: NodeId) -> Option<NodeKind> {
        if id == self.output {
            return None;
        }
        self.connections
            .retain(|conn, _| conn.from != id && conn.to != id);
        let kind = self.nodes.remove(&id)?;
        tracing::trace!("Detached node {} ({:?})", id, kind);
        Some(kind)
    }

    /// Connect `from`'s output to `to`.
    ///
    /// A node has a single output bus: connecting it again replaces the
    /// previous destination and format.
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        format: ConnectionFormat,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&from) {
            return Err(GraphError::NodeNotFound(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(GraphError::NodeNotFound(to));
        }
        if from == to {
            return Err(GraphError::SelfConnection(from));
        }

        self.connections.retain(|conn, _| conn.from != from);
        self.connections.insert(Connection { from, to }, format);
        tracing::trace!("Connected {} -> {} ({:?})", from, to, format);
        Ok(())
    }

    /// Disconnect whatever `id`'s output is connected to
    pub fn disconnect_node_output(&mut self, id: NodeId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|conn, _| conn.from != id);
        before != self.connections.len()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&id).copied()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
impl MixGraph {
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.connections.contains_key(&Connection { from, to })
    }

    /// Format of the connection leaving `from`, if any
    pub(crate) fn output_format(&self, from: NodeId) -> Option<ConnectionFormat> {
        self.connections
            .iter()
            .find(|(conn, _)| conn.from == from)
            .map(|(_, format)| *format)
    }

    /// Nodes feeding into `to`
    pub(crate) fn sources_of(&self, to: NodeId) -> Vec<NodeId> {
        let mut sources: Vec<NodeId> = self
            .connections
            .keys()
            .filter(|conn| conn.to == to)
            .map(|conn| conn.from)
            .collect();
        sources.sort_unstable();
        sources
    }
}

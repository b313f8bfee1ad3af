//! Engine error taxonomy.

use crate::controller::EngineState;
use crate::device::DeviceError;
use crate::graph::GraphError;
use crate::pool::PoolError;
use bounce3d_core::EntityHandle;
use std::path::PathBuf;

/// Errors surfaced by the audio graph controller
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operation not allowed in the current controller state
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    /// Unknown entity handle
    #[error("{0} has no voice")]
    NotFound(EntityHandle),

    /// The output device could not be opened or started (fatal)
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A bundled sound could not be loaded (fatal)
    #[error("Failed to load {}: {reason}", path.display())]
    AssetLoad { path: PathBuf, reason: String },

    /// The render command queue is full
    #[error("Render command queue is full")]
    CommandQueueFull,

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

impl EngineError {
    /// Errors the process cannot continue from
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_) | Self::AssetLoad { .. })
    }
}

impl From<DeviceError> for EngineError {
    fn from(err: DeviceError) -> Self {
        Self::DeviceUnavailable(err.to_string())
    }
}

impl EngineError {
    pub(crate) fn from_pool(err: PoolError, state: EngineState) -> Self {
        match err {
            PoolError::NotFound(entity) => Self::NotFound(entity),
            PoolError::Duplicate(_) => Self::InvalidState {
                operation: "create a second voice for an entity",
                state,
            },
            PoolError::Graph(e) => Self::Graph(e),
        }
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, EngineError>;

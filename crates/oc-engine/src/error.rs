use crate::graph::GraphError;
use crate::host::AudioError;

/// Error type for engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No audio context could be created
    Unavailable(AudioError),
    /// Offline rendering was requested on a realtime host
    RealtimeHost,
    /// Audio has not been initialized
    NotInitialized,
    Graph(GraphError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Unavailable(e) => write!(f, "Audio unavailable: {}", e),
            EngineError::RealtimeHost => write!(f, "Offline rendering needs a non-realtime host"),
            EngineError::NotInitialized => write!(f, "Audio not initialized"),
            EngineError::Graph(e) => write!(f, "Graph error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Unavailable(e) => Some(e),
            EngineError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        EngineError::Graph(e)
    }
}

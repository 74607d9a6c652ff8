//! Error types for thumbid-core

use crate::session::Generation;

/// Result type alias for thumbid operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every slot on the sensor is occupied
    #[error("Sensor storage full: {occupied} of {capacity} slots occupied")]
    StorageFull {
        occupied: usize,
        capacity: u16,
    },

    /// Command text not understood
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// Session not initialized
    #[error("Session not initialized - connect to device first")]
    SessionNotInitialized,

    /// Event or request belongs to an attempt that is no longer current
    #[error("Stale attempt generation: current {current}, got {actual}")]
    StaleGeneration {
        current: Generation,
        actual: Generation,
    },

    /// Timeout waiting for response
    #[error("Timeout waiting for response after {seconds}s")]
    Timeout {
        seconds: u64,
    },

    /// Domain type validation failed
    #[error(transparent)]
    Types(#[from] thumbid_types::Error),
}

impl Error {
    /// Check if error is recoverable (retry might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::StaleGeneration { .. }
        )
    }

    /// Check if error requires reconnection
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::SessionNotInitialized)
    }
}

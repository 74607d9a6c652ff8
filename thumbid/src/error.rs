//! High-level error types

use thumbid_types::UserId;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] thumbid_core::Error),
    
    #[error("Transport error: {0}")]
    Transport(#[from] thumbid_transport::Error),
    
    #[error("Type error: {0}")]
    Types(#[from] thumbid_types::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    
    #[error("Device not connected")]
    NotConnected,

    #[error("An enrollment is already in progress on this sensor")]
    Busy,

    #[error("Enrollment worker has stopped")]
    WorkerStopped,
    
    #[error("No user registered for this passkey")]
    UnknownPasskey,

    #[error("User {user_id} already has {count} fingerprints on unit {unit_label}")]
    SlotsExhausted {
        user_id: UserId,
        unit_label: String,
        count: usize,
    },
}

impl Error {
    /// Check if the error is a missed deadline rather than a dead link
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport(thumbid_transport::Error::ReadTimeout)
                | Self::Core(thumbid_core::Error::Timeout { .. })
        )
    }

    /// Check if the link to the sensor is gone
    pub fn is_link_loss(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_link_loss(),
            Self::NotConnected => true,
            _ => false,
        }
    }
}

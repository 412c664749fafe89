use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync is already in progress")]
    AlreadyInProgress,

    #[error("No API key configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication rejected by server (HTTP {status})")]
    Auth { status: u16 },

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Corrupt export bundle: {0}")]
    CorruptBundle(String),

    #[error("Target directory is missing")]
    MissingTargetDirectory,

    #[error("Resume cursor is set but the metadata snapshot is missing or unreadable")]
    StaleResumeState,

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    /// Conditions the orchestrator repairs by wiping state and starting over.
    pub fn is_self_healing(&self) -> bool {
        matches!(
            self,
            SyncError::MissingTargetDirectory | SyncError::StaleResumeState
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

use thiserror::Error;

use crate::presence::Identity;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("negotiation rejected for peer {peer}: {reason}")]
    NegotiationRejected { peer: Identity, reason: String },

    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("peer ceiling reached ({0} active links)")]
    CapacityExceeded(usize),

    #[error("transport failure for peer {peer}: {reason}")]
    TransportFailure { peer: Identity, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for voice operations
pub type Result<T> = std::result::Result<T, VoiceError>;

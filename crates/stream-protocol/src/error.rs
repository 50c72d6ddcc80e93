//! Protocol error types

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Datagram too short: {actual} bytes (need {expected})")]
    DatagramTooShort { expected: usize, actual: usize },

    #[error("Handshake datagram malformed: {0}")]
    MalformedHandshake(String),

    #[error("Fragment index {index} out of range (total {total})")]
    FragmentIndexOutOfRange { index: u32, total: u32 },

    #[error("Frame declares zero fragments")]
    EmptyFrame,

    #[error("Invalid quality value: {0} (must be 1-100)")]
    InvalidQuality(u8),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: crate::StreamState,
        to: crate::StreamState,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

//! Transport error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Receive timed out")]
    Timeout,

    #[error("No peer recorded; handshake has not completed")]
    NoPeer,

    #[error("Send error: {0}")]
    Send(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Recoverable errors let the caller's loop continue; anything else
    /// tears the connection down.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

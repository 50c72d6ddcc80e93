//! Pipeline error types

use thiserror::Error;

/// Pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Frame {sequence} corrupt: reassembled {actual} bytes, header says {expected}")]
    CorruptFrame {
        sequence: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame source failed: {0}")]
    Source(String),

    #[error("Frame sink failed: {0}")]
    Sink(String),

    #[error("Frame queue closed")]
    QueueClosed,

    #[error(transparent)]
    Protocol(#[from] stream_protocol::ProtocolError),

    #[error(transparent)]
    Crypto(#[from] stream_crypto::CryptoError),

    #[error(transparent)]
    Codec(#[from] stream_codec::CodecError),

    #[error(transparent)]
    Transport(#[from] stream_transport::TransportError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

//! Codec error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Buffer does not match dimensions: {width}x{height} needs {expected} bytes, got {actual}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

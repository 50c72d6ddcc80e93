//! Crypto error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Authentication failed: tag mismatch")]
    Authentication,

    #[error("Encrypted frame truncated: {actual} bytes (minimum {expected})")]
    TruncatedFrame { expected: usize, actual: usize },
}

pub type CryptoResult<T> = Result<T, CryptoError>;

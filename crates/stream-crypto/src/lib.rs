//! Session Crypto for Opticast
//!
//! RSA key wrap for the one-time handshake, AES-GCM for per-frame
//! authenticated encryption. The session key is generated fresh by the
//! receiving endpoint for every connection; frame nonces are random and
//! never reused (in particular, the handshake IV is never used as a
//! frame nonce).

mod cipher;
mod error;
mod session;

pub use cipher::*;
pub use error::*;
pub use session::*;

/// Valid AES key lengths in bytes
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Default AES key length (AES-256)
pub const DEFAULT_KEY_LENGTH: usize = 32;

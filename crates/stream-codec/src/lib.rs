//! Lossy Frame Codec for Opticast
//!
//! Pluggable image compression sitting between capture and encryption.
//! The reference implementation is JPEG; quality is the primary lever for
//! trading bandwidth against visual fidelity on a lossy transport.

mod error;
mod jpeg;
mod traits;

pub use error::*;
pub use jpeg::*;
pub use traits::*;

//! Wire Protocol Definitions for Opticast
//!
//! This crate contains the datagram wire formats, control messages, and
//! session state machine shared by the sender and receiver endpoints.

mod control;
mod error;
mod state;
mod wire;

pub use control::*;
pub use error::*;
pub use state::*;
pub use wire::*;

/// Largest fragment payload that keeps the full datagram under common
/// path MTU once the frame header is prepended.
pub const MAX_FRAGMENT_PAYLOAD: usize = 1400;

/// Handshake IV size in bytes
pub const HANDSHAKE_IV_SIZE: usize = 16;

/// Per-frame AES-GCM nonce size (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Fixed payload announcing a graceful close, sender -> receiver
pub const TERMINATE_SENTINEL: &[u8] = b"TERMINATE";

/// Fixed payload acknowledging a successful handshake, sender -> receiver
pub const STREAM_READY_SENTINEL: &[u8] = b"STREAM_READY";

/// Default JPEG quality (1-100)
pub const DEFAULT_QUALITY: u8 = 20;

/// Default frame queue depth on both endpoints
pub const DEFAULT_QUEUE_DEPTH: usize = 3;

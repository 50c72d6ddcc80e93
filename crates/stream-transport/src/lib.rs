//! Datagram Transport for Opticast
//!
//! Thin wrapper over a connectionless UDP socket: best-effort send to a
//! recorded peer, receive with a timeout. No delivery or ordering
//! guarantees; everything above this layer is built to tolerate that.

mod error;
mod transport;

pub use error::*;
pub use transport::*;

/// Default stream port
pub const DEFAULT_PORT: u16 = 9999;

/// Largest datagram we will ever read
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Default socket buffer size (4 MiB, sized for a 1080p stream)
pub const DEFAULT_SOCKET_BUFFER: usize = 4 * 1024 * 1024;

//! Stream configuration surface.

use std::time::Duration;

use stream_protocol::{DEFAULT_QUALITY, DEFAULT_QUEUE_DEPTH};

/// Tunables for one stream endpoint.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Target capture rate
    pub fps: u32,
    /// Compression quality (1-100)
    pub quality: u8,
    /// Fragments older than this are useless for real-time playback
    /// and dropped on arrival
    pub staleness: Duration,
    /// Blocking-receive timeout during the handshake
    pub handshake_timeout: Duration,
    /// Steady-state receive timeout; keeps loops responsive to shutdown
    pub recv_timeout: Duration,
    /// Bounded frame/display queue depth
    pub queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            quality: DEFAULT_QUALITY,
            staleness: Duration::from_millis(30),
            handshake_timeout: Duration::from_secs(20),
            recv_timeout: Duration::from_millis(750),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

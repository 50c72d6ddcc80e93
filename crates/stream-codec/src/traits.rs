//! Codec trait abstraction

use bytes::Bytes;

use crate::CodecResult;

/// An uncompressed frame, tightly packed RGB8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major
    pub data: Bytes,
}

impl RawFrame {
    /// Expected byte length for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Lossy image compressor/decompressor.
///
/// Implementations must tolerate per-frame failures; a bad frame is
/// skipped, never fatal to the stream.
pub trait LossyCodec: Send + Sync {
    /// Compress a raw frame.
    fn encode(&self, frame: &RawFrame) -> CodecResult<Vec<u8>>;

    /// Decompress back to raw pixels.
    fn decode(&self, data: &[u8]) -> CodecResult<RawFrame>;

    /// Adjust compression quality (1-100, clamped).
    fn set_quality(&mut self, quality: u8);

    /// Current quality setting.
    fn quality(&self) -> u8;
}

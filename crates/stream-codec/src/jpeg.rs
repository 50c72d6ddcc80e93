//! JPEG reference codec built on the `image` crate.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, RgbImage};

use crate::{CodecError, CodecResult, LossyCodec, RawFrame};

/// Quality-tunable JPEG codec.
#[derive(Debug, Clone)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    /// Create a codec at the given quality (1-100, clamped).
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl LossyCodec for JpegCodec {
    fn encode(&self, frame: &RawFrame) -> CodecResult<Vec<u8>> {
        if frame.data.len() != frame.expected_len() {
            return Err(CodecError::DimensionMismatch {
                width: frame.width,
                height: frame.height,
                expected: frame.expected_len(),
                actual: frame.data.len(),
            });
        }

        let img: RgbImage =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.to_vec()).ok_or(
                CodecError::DimensionMismatch {
                    width: frame.width,
                    height: frame.height,
                    expected: frame.expected_len(),
                    actual: frame.data.len(),
                },
            )?;

        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        img.write_with_encoder(encoder)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        Ok(buf.into_inner())
    }

    fn decode(&self, data: &[u8]) -> CodecResult<RawFrame> {
        let img = image::load_from_memory(data)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        Ok(RawFrame {
            width,
            height,
            data: Bytes::from(rgb.into_raw()),
        })
    }

    fn set_quality(&mut self, quality: u8) {
        self.quality = quality.clamp(1, 100);
    }

    fn quality(&self) -> u8 {
        self.quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> RawFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(128);
            }
        }
        RawFrame {
            width,
            height,
            data: Bytes::from(data),
        }
    }

    #[test]
    fn lossy_round_trip_preserves_dimensions() {
        let codec = JpegCodec::new(20);
        let frame = gradient_frame(64, 48);

        let compressed = codec.encode(&frame).unwrap();
        assert!(compressed.len() < frame.data.len());

        let decoded = codec.decode(&compressed).unwrap();
        assert_eq!(decoded.width, 64);
        assert_eq!(decoded.height, 48);
        assert_eq!(decoded.data.len(), decoded.expected_len());
    }

    #[test]
    fn higher_quality_costs_more_bytes() {
        let frame = gradient_frame(128, 96);
        let low = JpegCodec::new(10).encode(&frame).unwrap();
        let high = JpegCodec::new(95).encode(&frame).unwrap();
        assert!(high.len() > low.len());
    }

    #[test]
    fn quality_is_clamped() {
        let mut codec = JpegCodec::new(0);
        assert_eq!(codec.quality(), 1);
        codec.set_quality(200);
        assert_eq!(codec.quality(), 100);
        codec.set_quality(55);
        assert_eq!(codec.quality(), 55);
    }

    #[test]
    fn garbage_does_not_decode() {
        let codec = JpegCodec::new(20);
        assert!(matches!(
            codec.decode(&[0xDE, 0xAD, 0xBE, 0xEF]),
            Err(CodecError::DecodingFailed(_))
        ));
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        let codec = JpegCodec::new(20);
        let frame = RawFrame {
            width: 10,
            height: 10,
            data: Bytes::from_static(&[0u8; 7]),
        };
        assert!(matches!(
            codec.encode(&frame),
            Err(CodecError::DimensionMismatch { .. })
        ));
    }
}

//! Frame source abstraction.
//!
//! Camera and screen acquisition are external collaborators; the
//! pipeline only pulls raw frames through this trait. A synthetic test
//! pattern keeps the binaries and tests self-contained.

use std::time::{Duration, Instant};

use bytes::Bytes;
use stream_codec::RawFrame;

use crate::{PipelineError, PipelineResult};

/// A raw frame stamped with its capture time (seconds since epoch).
#[derive(Debug, Clone)]
pub struct TimedFrame {
    pub frame: RawFrame,
    pub timestamp: f64,
}

/// Pull-based frame producer, driven at its native rate from a
/// dedicated capture thread.
pub trait FrameSource: Send {
    /// Produce the next frame, blocking until one is available.
    /// `Ok(None)` signals the end of the stream.
    fn next_frame(&mut self) -> PipelineResult<Option<RawFrame>>;
}

/// Builds a fresh source each time streaming (re)starts. Pausing drops
/// the live source so the device is released; resuming calls this again.
pub type SourceFactory = Box<dyn Fn() -> PipelineResult<Box<dyn FrameSource>> + Send + Sync>;

/// Synthetic frame source: a moving gradient, paced at the target fps.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    frames_produced: u64,
    /// Stop after this many frames; `None` streams forever
    frame_limit: Option<u64>,
    last_frame_at: Option<Instant>,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            frames_produced: 0,
            frame_limit: None,
            last_frame_at: None,
        }
    }

    /// Stop after `limit` frames; used by tests and demos.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    fn render(&self) -> RawFrame {
        let phase = (self.frames_produced % 256) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + phase) % 256) as u8);
                data.push(((y + phase) % 256) as u8);
                data.push((phase % 256) as u8);
            }
        }
        RawFrame {
            width: self.width,
            height: self.height,
            data: Bytes::from(data),
        }
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> PipelineResult<Option<RawFrame>> {
        if let Some(limit) = self.frame_limit {
            if self.frames_produced >= limit {
                return Ok(None);
            }
        }

        // Pace to the configured fps, like a real device would.
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());

        let frame = self.render();
        self.frames_produced += 1;
        Ok(Some(frame))
    }
}

/// Convenience factory for the test pattern.
pub fn test_pattern_factory(width: u32, height: u32, fps: u32) -> SourceFactory {
    Box::new(move || {
        Ok(Box::new(TestPatternSource::new(width, height, fps)) as Box<dyn FrameSource>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_respects_frame_limit() {
        let mut source = TestPatternSource::new(8, 8, 1000).with_frame_limit(3);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn pattern_produces_well_formed_frames() {
        let mut source = TestPatternSource::new(16, 9, 1000);
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.width, 16);
        assert_eq!(frame.height, 9);
        assert_eq!(frame.data.len(), frame.expected_len());
    }

    #[test]
    fn factory_builds_fresh_sources() {
        let factory = test_pattern_factory(8, 8, 1000);
        let mut a = factory().unwrap();
        let mut b = factory().unwrap();
        assert!(a.next_frame().unwrap().is_some());
        assert!(b.next_frame().unwrap().is_some());
    }

    #[test]
    fn source_errors_are_typed() {
        let err = PipelineError::Source("device unplugged".into());
        assert!(err.to_string().contains("device unplugged"));
    }
}

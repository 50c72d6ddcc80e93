//! Frame sink abstraction.
//!
//! Display rendering is an external collaborator. The bundled sink just
//! logs end-to-end latency, which is the observability signal the
//! receiver computes per frame.

use std::time::{Duration, Instant};

use stream_codec::RawFrame;
use tracing::info;

use crate::PipelineResult;

/// Consumes decoded frames on the display thread.
pub trait FrameSink: Send + Sync {
    /// Render one frame. `latency` is now minus the frame's capture
    /// timestamp.
    fn present(&mut self, frame: RawFrame, latency: Duration) -> PipelineResult<()>;
}

/// Sink that logs per-frame latency and a once-a-second fps summary.
pub struct StatsSink {
    frames: u64,
    window_frames: u64,
    window_start: Instant,
}

impl StatsSink {
    pub fn new() -> Self {
        Self {
            frames: 0,
            window_frames: 0,
            window_start: Instant::now(),
        }
    }

    /// Total frames presented.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for StatsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for StatsSink {
    fn present(&mut self, frame: RawFrame, latency: Duration) -> PipelineResult<()> {
        self.frames += 1;
        self.window_frames += 1;

        info!(
            "Frame {} {}x{}, latency {:.2} ms",
            self.frames,
            frame.width,
            frame.height,
            latency.as_secs_f64() * 1000.0
        );

        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            info!(
                "Display rate: {:.1} fps",
                self.window_frames as f64 / elapsed.as_secs_f64()
            );
            self.window_frames = 0;
            self.window_start = Instant::now();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn stats_sink_counts_frames() {
        let mut sink = StatsSink::new();
        let frame = RawFrame {
            width: 2,
            height: 2,
            data: Bytes::from(vec![0u8; 12]),
        };
        sink.present(frame.clone(), Duration::from_millis(5)).unwrap();
        sink.present(frame, Duration::from_millis(7)).unwrap();
        assert_eq!(sink.frames(), 2);
    }
}

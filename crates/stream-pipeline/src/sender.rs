//! Sender pipeline: capture -> encode -> encrypt -> fragment -> transmit.

use std::sync::Arc;
use std::thread::JoinHandle;

use rsa::RsaPrivateKey;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use stream_codec::LossyCodec;
use stream_crypto::{unwrap_session_key, FrameCipher, SessionKey};
use stream_protocol::{
    fragment_frame, unix_timestamp, ClientHello, ControlCommand, StreamState,
    STREAM_READY_SENTINEL, TERMINATE_SENTINEL,
};
use stream_transport::{TransportError, UdpTransport};

use crate::{
    frame_queue, FrameConsumer, PipelineError, PipelineResult, ShutdownToken, SourceFactory,
    StreamConfig, TimedFrame,
};

/// Capture thread plus its end of the frame queue.
struct CaptureTask {
    frames: FrameConsumer<TimedFrame>,
    stop: ShutdownToken,
    handle: JoinHandle<()>,
}

/// Whether the control loop keeps running after a command.
enum ControlFlow {
    Continue,
    Stop,
}

/// The camera-side endpoint.
///
/// Waits for the one-time key exchange, then streams frames from the
/// capture thread until the source ends, the peer terminates, or the
/// shutdown token fires. Control commands from the receiver (pause,
/// resume, quality, terminate) are decrypted and applied between frames.
pub struct SenderPipeline {
    transport: Arc<UdpTransport>,
    private_key: RsaPrivateKey,
    codec: Box<dyn LossyCodec>,
    source_factory: SourceFactory,
    config: StreamConfig,
    shutdown: ShutdownToken,
}

impl SenderPipeline {
    pub fn new(
        transport: Arc<UdpTransport>,
        private_key: RsaPrivateKey,
        codec: Box<dyn LossyCodec>,
        source_factory: SourceFactory,
        config: StreamConfig,
    ) -> Self {
        Self {
            transport,
            private_key,
            codec,
            source_factory,
            config,
            shutdown: ShutdownToken::new(),
        }
    }

    /// Token that stops the pipeline from another task or a signal
    /// handler.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Run the pipeline to completion.
    pub async fn run(mut self) -> PipelineResult<()> {
        let mut state = StreamState::Idle;
        state.transition(StreamState::HandshakePending)?;

        let session = self.await_handshake().await?;
        let cipher = FrameCipher::new(&session)?;

        self.transport.send(STREAM_READY_SENTINEL).await?;
        state.transition(StreamState::Streaming)?;
        info!("Handshake complete, streaming to {:?}", self.transport.peer());

        let mut capture = Some(self.spawn_capture()?);
        let mut sequence: u32 = 0;

        let result = loop {
            if self.shutdown.is_triggered() {
                break Ok(());
            }

            tokio::select! {
                maybe_frame = next_frame(&mut capture) => {
                    match maybe_frame {
                        Some(timed) => {
                            self.ship_frame(&cipher, &timed, sequence).await;
                            sequence = sequence.wrapping_add(1);
                        }
                        None => {
                            info!("Frame source ended");
                            break Ok(());
                        }
                    }
                }

                incoming = self.transport.recv_timeout(self.config.recv_timeout) => {
                    match incoming {
                        Err(TransportError::Timeout) => {}
                        Err(e) => break Err(PipelineError::ConnectionClosed(e.to_string())),
                        Ok((data, from)) => {
                            if Some(from) != self.transport.peer() {
                                debug!("Ignoring datagram from unknown peer {}", from);
                                continue;
                            }
                            match self.apply_control(&cipher, &data, &mut state, &mut capture) {
                                ControlFlow::Continue => {}
                                ControlFlow::Stop => break Ok(()),
                            }
                        }
                    }
                }
            }
        };

        // Best-effort graceful close; the receiver also survives losing
        // this datagram via its own timeout handling.
        if let Err(e) = self.transport.send(TERMINATE_SENTINEL).await {
            debug!("Failed to send termination sentinel: {}", e);
        }

        if let Some(task) = capture.take() {
            stop_capture(task);
        }
        state.transition(StreamState::Closed)?;
        info!("Sender pipeline closed");

        result
    }

    /// One blocking receive with a generous timeout, then unwrap the
    /// session key and record the peer.
    async fn await_handshake(&self) -> PipelineResult<SessionKey> {
        info!(
            "Waiting for key exchange on {} (timeout {:?})",
            self.transport.local_addr()?,
            self.config.handshake_timeout
        );

        match self.transport.recv_timeout(self.config.handshake_timeout).await {
            Err(TransportError::Timeout) => Err(PipelineError::HandshakeTimeout),
            Err(e) => Err(PipelineError::ConnectionClosed(e.to_string())),
            Ok((data, from)) => {
                let hello = ClientHello::decode(&data)
                    .map_err(|e| PipelineError::HandshakeFailed(e.to_string()))?;
                let session = unwrap_session_key(&self.private_key, &hello)
                    .map_err(|e| PipelineError::HandshakeFailed(e.to_string()))?;

                self.transport.connect_peer(from);
                info!("Key exchange with {} succeeded", from);
                Ok(session)
            }
        }
    }

    /// Encode, seal, fragment and transmit one frame. Every failure in
    /// here is per-frame recoverable: log, skip, keep streaming.
    async fn ship_frame(&self, cipher: &FrameCipher, timed: &TimedFrame, sequence: u32) {
        let started = Instant::now();

        let compressed = match self.codec.encode(&timed.frame) {
            Ok(data) => data,
            Err(e) => {
                warn!("Frame {} encode failed, skipping: {}", sequence, e);
                return;
            }
        };

        let sealed = match cipher.seal(&compressed) {
            Ok(data) => data,
            Err(e) => {
                warn!("Frame {} encryption failed, skipping: {}", sequence, e);
                return;
            }
        };

        let fragments = fragment_frame(timed.timestamp, sequence, &sealed);
        let total = fragments.len();
        for fragment in fragments {
            // Best-effort delivery: a failed fragment is not retried.
            if let Err(e) = self.transport.send(&fragment).await {
                warn!("Frame {}: fragment send failed: {}", sequence, e);
            }
        }

        debug!(
            "Frame {}: {} bytes in {} fragments, {:.2} ms",
            sequence,
            sealed.len(),
            total,
            started.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Decrypt and apply one control datagram from the receiver.
    fn apply_control(
        &mut self,
        cipher: &FrameCipher,
        data: &[u8],
        state: &mut StreamState,
        capture: &mut Option<CaptureTask>,
    ) -> ControlFlow {
        let plaintext = match cipher.open(data) {
            Ok(p) => p,
            Err(e) => {
                warn!("Dropping unauthenticated control datagram: {}", e);
                return ControlFlow::Continue;
            }
        };

        let command = match ControlCommand::from_bytes(&plaintext) {
            Ok(c) => c,
            Err(e) => {
                warn!("Malformed control command: {}", e);
                return ControlFlow::Continue;
            }
        };

        match command {
            ControlCommand::Pause => {
                if state.can_transition(StreamState::Paused) {
                    info!("Pausing stream, releasing capture source");
                    if let Some(task) = capture.take() {
                        stop_capture(task);
                    }
                    let _ = state.transition(StreamState::Paused);
                } else {
                    debug!("Ignoring pause in state {:?}", state);
                }
            }
            ControlCommand::Resume => {
                if state.can_transition(StreamState::Streaming) && capture.is_none() {
                    info!("Resuming stream");
                    match self.spawn_capture() {
                        Ok(task) => {
                            *capture = Some(task);
                            let _ = state.transition(StreamState::Streaming);
                        }
                        Err(e) => warn!("Failed to re-acquire frame source: {}", e),
                    }
                } else {
                    debug!("Ignoring resume in state {:?}", state);
                }
            }
            ControlCommand::SetQuality { value } => {
                if !(1..=100).contains(&value) {
                    warn!("Ignoring out-of-range quality {}", value);
                } else if state.allows_reconfigure() {
                    info!("Quality set to {}", value);
                    self.codec.set_quality(value);
                } else {
                    debug!("Ignoring quality change in state {:?}", state);
                }
            }
            ControlCommand::Terminate => {
                info!("Receiver requested termination");
                return ControlFlow::Stop;
            }
        }

        ControlFlow::Continue
    }

    /// Spawn the capture thread: pull frames at the source's native
    /// rate, stamp capture time, push into the bounded frame queue
    /// (blocking until space).
    fn spawn_capture(&self) -> PipelineResult<CaptureTask> {
        let mut source = (self.source_factory)()?;
        let (tx, frames) = frame_queue(self.config.queue_depth);
        let stop = ShutdownToken::new();
        let stop_flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name("opticast-capture".into())
            .spawn(move || {
                debug!("Capture thread started");
                while !stop_flag.is_triggered() {
                    match source.next_frame() {
                        Ok(Some(frame)) => {
                            let timed = TimedFrame {
                                frame,
                                timestamp: unix_timestamp(),
                            };
                            if tx.send_blocking(timed).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Capture failed: {}", e);
                            break;
                        }
                    }
                }
                debug!("Capture thread ended");
            })
            .map_err(|e| PipelineError::Source(e.to_string()))?;

        Ok(CaptureTask { frames, stop, handle })
    }
}

/// Await the next captured frame, or park forever while paused.
async fn next_frame(capture: &mut Option<CaptureTask>) -> Option<TimedFrame> {
    match capture {
        Some(task) => task.frames.recv().await,
        None => std::future::pending().await,
    }
}

fn stop_capture(task: CaptureTask) {
    task.stop.trigger();
    // Dropping the consumer unblocks a producer parked on a full queue.
    drop(task.frames);
    // The thread may still be pacing its next frame; join it off the
    // executor so the control path never stalls behind that sleep.
    let _ = tokio::task::spawn_blocking(move || {
        if task.handle.join().is_err() {
            warn!("Capture thread panicked");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::{FrameSource, TestPatternSource};

    #[tokio::test]
    async fn stopping_capture_does_not_wait_out_frame_pacing() {
        let (tx, frames) = frame_queue(3);
        let stop = ShutdownToken::new();
        let stop_flag = stop.clone();

        // 1 fps source: the thread spends ~1 s asleep between frames.
        let handle = std::thread::spawn(move || {
            let mut source = TestPatternSource::new(8, 8, 1);
            while !stop_flag.is_triggered() {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        let timed = TimedFrame {
                            frame,
                            timestamp: unix_timestamp(),
                        };
                        if tx.send_blocking(timed).is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        });

        let task = CaptureTask {
            frames,
            stop,
            handle,
        };
        let started = std::time::Instant::now();
        stop_capture(task);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}

//! Receiver pipeline: receive -> reassemble -> decrypt -> decode ->
//! display.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rsa::RsaPublicKey;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use stream_codec::LossyCodec;
use stream_crypto::{wrap_session_key, FrameCipher, SessionKey, DEFAULT_KEY_LENGTH};
use stream_protocol::{
    ControlCommand, FrameHeader, StreamState, STREAM_READY_SENTINEL, TERMINATE_SENTINEL,
};
use stream_transport::{TransportError, UdpTransport};

use crate::{
    display_queue, DisplayPop, FrameAssembler, FrameSink, PipelineError, PipelineResult,
    ShutdownToken, StreamConfig, TimedFrame,
};

/// Pending-entry cap for the reassembly table; GC by sequence keeps it
/// far below this in practice.
const MAX_PENDING_FRAMES: usize = 64;

/// Handle for steering a running receiver from another task.
#[derive(Clone)]
pub struct ControlHandle {
    commands: mpsc::UnboundedSender<ControlCommand>,
    shutdown: ShutdownToken,
}

impl ControlHandle {
    /// Ask the sender to release its capture source.
    pub fn pause(&self) -> PipelineResult<()> {
        self.send(ControlCommand::Pause)
    }

    /// Ask the sender to resume streaming.
    pub fn resume(&self) -> PipelineResult<()> {
        self.send(ControlCommand::Resume)
    }

    /// Ask the sender to change compression quality (1-100).
    pub fn set_quality(&self, value: u8) -> PipelineResult<()> {
        if !(1..=100).contains(&value) {
            return Err(stream_protocol::ProtocolError::InvalidQuality(value).into());
        }
        self.send(ControlCommand::SetQuality { value })
    }

    /// End the session gracefully.
    pub fn terminate(&self) -> PipelineResult<()> {
        self.send(ControlCommand::Terminate)
    }

    /// Stop the local pipeline without telling the peer.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    fn send(&self, command: ControlCommand) -> PipelineResult<()> {
        self.commands
            .send(command)
            .map_err(|_| PipelineError::QueueClosed)
    }
}

/// The display-side endpoint.
///
/// Initiates the key exchange, then receives fragments until the sender
/// terminates, an unrecoverable socket error occurs, or the shutdown
/// token fires. Decoded frames go to a bounded display queue consumed
/// by a dedicated thread that renders and reports end-to-end latency.
pub struct ReceiverPipeline {
    transport: Arc<UdpTransport>,
    public_key: RsaPublicKey,
    codec: Box<dyn LossyCodec>,
    sink: Option<Box<dyn FrameSink>>,
    config: StreamConfig,
    shutdown: ShutdownToken,
    command_tx: mpsc::UnboundedSender<ControlCommand>,
    command_rx: mpsc::UnboundedReceiver<ControlCommand>,
}

impl ReceiverPipeline {
    pub fn new(
        transport: Arc<UdpTransport>,
        sender_addr: SocketAddr,
        public_key: RsaPublicKey,
        codec: Box<dyn LossyCodec>,
        sink: Box<dyn FrameSink>,
        config: StreamConfig,
    ) -> Self {
        transport.connect_peer(sender_addr);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            public_key,
            codec,
            sink: Some(sink),
            config,
            shutdown: ShutdownToken::new(),
            command_tx,
            command_rx,
        }
    }

    /// Control handle, valid for the lifetime of the pipeline.
    pub fn control(&self) -> ControlHandle {
        ControlHandle {
            commands: self.command_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run the pipeline to completion.
    pub async fn run(mut self) -> PipelineResult<()> {
        let mut state = StreamState::Idle;
        state.transition(StreamState::HandshakePending)?;

        // Fresh session material every connection; the sender never
        // sees the AES key in the clear.
        let session = SessionKey::generate(DEFAULT_KEY_LENGTH)?;
        let hello = wrap_session_key(&self.public_key, &session)?;
        let cipher = FrameCipher::new(&session)?;

        info!("Sending key exchange to {:?}", self.transport.peer());
        self.transport.send(&hello.encode()).await?;

        self.await_stream_ready().await?;
        state.transition(StreamState::Streaming)?;
        info!("Stream ready, receiving");

        let (display_tx, display_rx) = display_queue(self.config.queue_depth);
        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => return Err(PipelineError::Sink("sink already consumed".into())),
        };
        let display = spawn_display(sink, display_rx, self.shutdown.clone())?;

        let mut assembler = FrameAssembler::new(MAX_PENDING_FRAMES);

        let result = loop {
            if self.shutdown.is_triggered() {
                break Ok(());
            }

            tokio::select! {
                command = self.command_rx.recv() => {
                    // `self` holds a sender, so recv never yields None.
                    if let Some(command) = command {
                        self.forward_command(&cipher, command).await;
                        if command == ControlCommand::Terminate {
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
                            if &data[..] == TERMINATE_SENTINEL {
                                info!("Sender terminated the stream");
                                break Ok(());
                            }
                            if &data[..] == STREAM_READY_SENTINEL {
                                continue;
                            }
                            self.ingest_fragment(&cipher, &data, &mut assembler, &display_tx);
                        }
                    }
                }
            }
        };

        // Unblocks the display thread via queue disconnection.
        drop(display_tx);
        if display.join().is_err() {
            warn!("Display thread panicked");
        }
        state.transition(StreamState::Closed)?;
        info!("Receiver pipeline closed");

        result
    }

    /// Wait for the sender's handshake acknowledgment.
    async fn await_stream_ready(&self) -> PipelineResult<()> {
        let deadline = Instant::now() + self.config.handshake_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PipelineError::HandshakeTimeout);
            }

            match self.transport.recv_timeout(remaining).await {
                Err(TransportError::Timeout) => return Err(PipelineError::HandshakeTimeout),
                Err(e) => return Err(PipelineError::ConnectionClosed(e.to_string())),
                Ok((data, _)) if &data[..] == STREAM_READY_SENTINEL => return Ok(()),
                // A frame racing ahead of the ack is fine; keep waiting.
                Ok(_) => continue,
            }
        }
    }

    /// Seal and transmit one locally issued control command.
    async fn forward_command(&self, cipher: &FrameCipher, command: ControlCommand) {
        let bytes = match command.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to serialize {:?}: {}", command, e);
                return;
            }
        };
        let sealed = match cipher.seal(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to seal {:?}: {}", command, e);
                return;
            }
        };
        if let Err(e) = self.transport.send(&sealed).await {
            warn!("Failed to send {:?}: {}", command, e);
        }
    }

    /// Validate, reassemble and, on completion, decrypt + decode one
    /// fragment datagram. Every failure is per-frame recoverable.
    fn ingest_fragment(
        &self,
        cipher: &FrameCipher,
        data: &[u8],
        assembler: &mut FrameAssembler,
        display_tx: &crate::DisplayProducer<TimedFrame>,
    ) {
        if data.len() < FrameHeader::SIZE {
            debug!("Datagram too small ({} bytes), skipping", data.len());
            return;
        }

        let header = match FrameHeader::decode(data) {
            Ok(h) => h,
            Err(e) => {
                debug!("Bad fragment header: {}", e);
                return;
            }
        };

        // Core latency-over-reliability tradeoff: a fragment past the
        // staleness threshold is useless for real-time playback even if
        // its frame could still complete.
        if header.age_secs() > self.config.staleness.as_secs_f64() {
            debug!(
                "Frame {} too old ({:.1} ms), dropping fragment",
                header.sequence,
                header.age_secs() * 1000.0
            );
            return;
        }

        let encrypted = match assembler.insert(&header, &data[FrameHeader::SIZE..]) {
            Ok(Some(encrypted)) => encrypted,
            Ok(None) => return,
            Err(e) => {
                warn!("Frame {} dropped: {}", header.sequence, e);
                return;
            }
        };

        let plaintext = match cipher.open(&encrypted) {
            Ok(p) => p,
            Err(e) => {
                warn!("Frame {} failed authentication, dropping: {}", header.sequence, e);
                return;
            }
        };

        let frame = match self.codec.decode(&plaintext) {
            Ok(f) => f,
            Err(e) => {
                warn!("Frame {} failed to decode, dropping: {}", header.sequence, e);
                return;
            }
        };

        let timed = TimedFrame {
            frame,
            timestamp: header.timestamp,
        };
        match display_tx.offer(timed) {
            Ok(true) => {}
            Ok(false) => debug!("Display queue full, frame {} dropped", header.sequence),
            Err(_) => debug!("Display queue closed"),
        }
    }
}

/// Display thread: pops decoded frames, computes end-to-end latency and
/// hands them to the sink.
fn spawn_display(
    mut sink: Box<dyn FrameSink>,
    display_rx: crate::DisplayConsumer<TimedFrame>,
    shutdown: ShutdownToken,
) -> PipelineResult<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("opticast-display".into())
        .spawn(move || {
            debug!("Display thread started");
            loop {
                match display_rx.pop_timeout(Duration::from_millis(500)) {
                    DisplayPop::Frame(timed) => {
                        let latency = Duration::from_secs_f64(
                            (stream_protocol::unix_timestamp() - timed.timestamp).max(0.0),
                        );
                        if let Err(e) = sink.present(timed.frame, latency) {
                            warn!("Sink failed, stopping display: {}", e);
                            break;
                        }
                    }
                    DisplayPop::Empty => {
                        if shutdown.is_triggered() {
                            break;
                        }
                    }
                    DisplayPop::Closed => break,
                }
            }
            debug!("Display thread ended");
        })
        .map_err(|e| PipelineError::Sink(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;

    use stream_codec::JpegCodec;
    use stream_protocol::{fragment_frame, unix_timestamp};
    use stream_transport::TransportConfig;

    use crate::StatsSink;

    fn test_pipeline(config: StreamConfig) -> ReceiverPipeline {
        let transport = Arc::new(
            UdpTransport::bind("127.0.0.1:0".parse().unwrap(), &TransportConfig::default())
                .unwrap(),
        );
        let peer = transport.local_addr().unwrap();
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();

        ReceiverPipeline::new(
            transport,
            peer,
            rsa::RsaPublicKey::from(&private),
            Box::new(JpegCodec::new(20)),
            Box::new(StatsSink::new()),
            config,
        )
    }

    #[tokio::test]
    async fn stale_fragments_never_enter_the_reassembly_table() {
        // Default config: 30 ms staleness threshold.
        let pipeline = test_pipeline(StreamConfig::default());
        let cipher = FrameCipher::new(&SessionKey::generate(DEFAULT_KEY_LENGTH).unwrap()).unwrap();
        let mut assembler = FrameAssembler::new(8);
        let (display_tx, _display_rx) = display_queue(3);

        // Captured a full second ago: dropped on arrival, zero fragments
        // retained even though the frame could still complete.
        let sealed = cipher.seal(&vec![7u8; 3000]).unwrap();
        let stale = fragment_frame(unix_timestamp() - 1.0, 0, &sealed);
        pipeline.ingest_fragment(&cipher, &stale[0], &mut assembler, &display_tx);
        assert_eq!(assembler.pending(), 0);
        assert!(!assembler.contains(0));

        // A fresh fragment of the same shape is retained.
        let fresh = fragment_frame(unix_timestamp(), 1, &sealed);
        pipeline.ingest_fragment(&cipher, &fresh[0], &mut assembler, &display_tx);
        assert_eq!(assembler.pending(), 1);
        assert!(assembler.contains(1));
    }
}

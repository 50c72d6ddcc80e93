//! Full-pipeline tests: sender and receiver over real UDP sockets on
//! loopback, with a synthetic frame source and a collecting sink.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};

use stream_codec::{JpegCodec, RawFrame};
use stream_pipeline::{
    test_pattern_factory, FrameSink, PipelineResult, ReceiverPipeline, SenderPipeline,
    StreamConfig,
};
use stream_transport::{TransportConfig, UdpTransport};

const TEST_KEY_BITS: usize = 1024;

/// Sink that records every presented frame.
struct CollectingSink {
    frames: Arc<Mutex<Vec<RawFrame>>>,
}

impl FrameSink for CollectingSink {
    fn present(&mut self, frame: RawFrame, _latency: Duration) -> PipelineResult<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

fn test_config() -> StreamConfig {
    StreamConfig {
        width: 64,
        height: 48,
        fps: 60,
        // Loopback latency is unbounded under CI load; a generous
        // staleness window keeps the test about delivery, not timing.
        staleness: Duration::from_secs(10),
        handshake_timeout: Duration::from_secs(10),
        recv_timeout: Duration::from_millis(100),
        ..StreamConfig::default()
    }
}

fn bind_pair() -> (Arc<UdpTransport>, Arc<UdpTransport>) {
    let config = TransportConfig::default();
    let sender = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), &config).unwrap();
    let receiver = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), &config).unwrap();
    (Arc::new(sender), Arc::new(receiver))
}

fn test_keys() -> (RsaPrivateKey, RsaPublicKey) {
    let private = RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS).unwrap();
    let public = RsaPublicKey::from(&private);
    (private, public)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bounded_stream_delivers_frames_end_to_end() {
    let (private, public) = test_keys();
    let (sender_transport, receiver_transport) = bind_pair();
    let sender_addr = sender_transport.local_addr().unwrap();
    let config = test_config();

    let sender = SenderPipeline::new(
        sender_transport,
        private,
        Box::new(JpegCodec::new(config.quality)),
        Box::new({
            let (width, height, fps) = (config.width, config.height, config.fps);
            move || {
                Ok(Box::new(
                    stream_pipeline::TestPatternSource::new(width, height, fps)
                        .with_frame_limit(5),
                ) as Box<dyn stream_pipeline::FrameSource>)
            }
        }),
        config.clone(),
    );

    let frames = Arc::new(Mutex::new(Vec::new()));
    let receiver = ReceiverPipeline::new(
        receiver_transport,
        sender_addr,
        public,
        Box::new(JpegCodec::new(config.quality)),
        Box::new(CollectingSink {
            frames: frames.clone(),
        }),
        config,
    );

    let sender_task = tokio::spawn(sender.run());
    let receiver_task = tokio::spawn(receiver.run());

    let both = async {
        sender_task.await.unwrap().unwrap();
        receiver_task.await.unwrap().unwrap();
    };
    tokio::time::timeout(Duration::from_secs(30), both)
        .await
        .expect("pipelines did not finish in time");

    let frames = frames.lock();
    // UDP on loopback should not drop, but the contract is only
    // best-effort; at least one frame must survive the full path.
    assert!(!frames.is_empty(), "no frames reached the sink");
    assert!(frames.len() <= 5);
    for frame in frames.iter() {
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.data.len(), frame.expected_len());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receiver_terminate_stops_both_endpoints() {
    let (private, public) = test_keys();
    let (sender_transport, receiver_transport) = bind_pair();
    let sender_addr = sender_transport.local_addr().unwrap();
    let config = test_config();

    // Unbounded source: only the terminate command ends this stream.
    let sender = SenderPipeline::new(
        sender_transport,
        private,
        Box::new(JpegCodec::new(config.quality)),
        test_pattern_factory(config.width, config.height, config.fps),
        config.clone(),
    );

    let frames = Arc::new(Mutex::new(Vec::new()));
    let receiver = ReceiverPipeline::new(
        receiver_transport,
        sender_addr,
        public,
        Box::new(JpegCodec::new(config.quality)),
        Box::new(CollectingSink {
            frames: frames.clone(),
        }),
        config,
    );
    let control = receiver.control();

    let sender_task = tokio::spawn(sender.run());
    let receiver_task = tokio::spawn(receiver.run());

    // Let a few frames through, nudge quality, then hang up.
    let waited = tokio::time::timeout(Duration::from_secs(15), async {
        while frames.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "stream never produced 3 frames");

    control.set_quality(60).unwrap();
    control.terminate().unwrap();

    let both = async {
        receiver_task.await.unwrap().unwrap();
        sender_task.await.unwrap().unwrap();
    };
    tokio::time::timeout(Duration::from_secs(30), both)
        .await
        .expect("terminate did not stop the pipelines");

    assert!(frames.lock().len() >= 3);
}

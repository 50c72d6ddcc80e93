//! Opticast Sender
//!
//! Camera-side endpoint: waits for a receiver's key exchange, then
//! streams encrypted frames over UDP. Uses the bundled test pattern as
//! the frame source; real capture devices plug in through the same
//! source trait.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use tracing::info;

use stream_codec::JpegCodec;
use stream_pipeline::{test_pattern_factory, SenderPipeline, StreamConfig};
use stream_protocol::DEFAULT_QUALITY;
use stream_transport::{TransportConfig, UdpTransport, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "opticast-sender", about = "Encrypted UDP frame streamer")]
struct Args {
    /// Address to listen on for the receiver's key exchange
    #[arg(long, default_value_t = default_listen())]
    listen: SocketAddr,

    /// RSA private key (PKCS#1 PEM)
    #[arg(long)]
    private_key: PathBuf,

    /// Frame width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Target frame rate
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Initial JPEG quality (1-100)
    #[arg(long, default_value_t = DEFAULT_QUALITY)]
    quality: u8,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opticast_sender=info".parse()?)
                .add_directive("stream_pipeline=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!("Starting Opticast Sender");

    let private_key = RsaPrivateKey::read_pkcs1_pem_file(&args.private_key)
        .with_context(|| {
            format!(
                "failed to load private key from {}",
                args.private_key.display()
            )
        })?;

    let transport = UdpTransport::bind(args.listen, &TransportConfig::default())
        .context("failed to bind UDP socket")?;

    let config = StreamConfig {
        width: args.width,
        height: args.height,
        fps: args.fps,
        quality: args.quality,
        ..StreamConfig::default()
    };

    let pipeline = SenderPipeline::new(
        Arc::new(transport),
        private_key,
        Box::new(JpegCodec::new(config.quality)),
        test_pattern_factory(config.width, config.height, config.fps),
        config,
    );

    let shutdown = pipeline.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            shutdown.trigger();
        }
    });

    pipeline.run().await?;
    Ok(())
}

//! Opticast Receiver
//!
//! Display-side endpoint: initiates the key exchange with a sender,
//! receives and decodes the encrypted frame stream, and logs per-frame
//! latency through the stats sink. Real renderers plug in through the
//! same sink trait.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;
use tracing::info;

use stream_codec::JpegCodec;
use stream_pipeline::{ReceiverPipeline, StatsSink, StreamConfig};
use stream_transport::{TransportConfig, UdpTransport};

#[derive(Parser, Debug)]
#[command(name = "opticast-receiver", about = "Encrypted UDP frame receiver")]
struct Args {
    /// Sender address, e.g. 192.168.1.10:9999
    #[arg(long)]
    sender: SocketAddr,

    /// Sender's RSA public key (PKCS#1 PEM)
    #[arg(long)]
    public_key: PathBuf,

    /// Local address to bind
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Ask the sender for this JPEG quality once streaming starts
    #[arg(long)]
    quality: Option<u8>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opticast_receiver=info".parse()?)
                .add_directive("stream_pipeline=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!("Starting Opticast Receiver");

    let public_key = RsaPublicKey::read_pkcs1_pem_file(&args.public_key)
        .with_context(|| {
            format!(
                "failed to load public key from {}",
                args.public_key.display()
            )
        })?;

    let transport = UdpTransport::bind(args.bind, &TransportConfig::default())
        .context("failed to bind UDP socket")?;

    let config = StreamConfig::default();
    let pipeline = ReceiverPipeline::new(
        Arc::new(transport),
        args.sender,
        public_key,
        Box::new(JpegCodec::new(config.quality)),
        Box::new(StatsSink::new()),
        config,
    );

    let control = pipeline.control();
    if let Some(quality) = args.quality {
        control.set_quality(quality)?;
    }

    tokio::spawn({
        let control = control.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, hanging up");
                // Graceful: tells the sender before the local loop stops.
                let _ = control.terminate();
            }
        }
    });

    pipeline.run().await?;
    Ok(())
}

//! midiproc peer binary
//!
//! Connects to a running bridge, echoes every captured event back with an
//! optional transpose and delay.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use midiconf::{expand_path, MidiprocConfig};
use midiproc::transport::zmq::{ZmqInbound, ZmqOutbound};
use midiproc::{Peer, PeerTransform, Shutdown};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// midiproc-peer - transform and echo events for a midiproc bridge
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Semitones added to note pitches
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    transpose: i8,

    /// Frames added to every scheduled time
    #[arg(long, default_value_t = 0)]
    delay: u64,

    /// Config file (replaces ./midiproc.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .as_deref()
        .map(|p| expand_path(&p.to_string_lossy()));
    let config =
        MidiprocConfig::load_from(config_path.as_deref()).context("Failed to load config")?;

    let filter = EnvFilter::try_new(&config.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("midiproc-peer {} starting", env!("CARGO_PKG_VERSION"));
    info!("  receiving from: {}", config.transport.outbound);
    info!("  sending to: {}", config.transport.inbound);

    // The bridge's outbound is our inbound and vice versa
    let ctx = zmq::Context::new();
    let inbound = ZmqInbound::connect(&ctx, &config.transport.outbound)
        .with_context(|| format!("Failed to connect {}", config.transport.outbound))?;
    let outbound = ZmqOutbound::connect(&ctx, &config.transport.inbound)
        .with_context(|| format!("Failed to connect {}", config.transport.inbound))?;

    let transform = PeerTransform {
        transpose: args.transpose,
        delay: args.delay,
    };
    let mut peer = Peer::new(inbound, outbound, transform)
        .with_poll(Duration::from_millis(config.transport.recv_poll_ms));

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal.trigger();
    });

    let summary = tokio::task::spawn_blocking(move || peer.run(&shutdown))
        .await
        .context("Peer task panicked")?
        .context("Peer channel failed")?;

    info!(
        "midiproc-peer shutdown complete ({} echoed, {} malformed)",
        summary.echoed, summary.malformed
    );
    Ok(())
}

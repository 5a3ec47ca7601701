//! midiproc bridge binary
//!
//! Opens the ZeroMQ channels and MIDI ports, starts the bridge workers and
//! the clocked host, then runs until Ctrl-C or a fatal channel error.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use midiconf::{expand_path, MidiprocConfig};
use midiproc::transport::zmq::{ZmqInbound, ZmqOutbound};
use midiproc::{bridge_config, Bridge, ClockedMidiDriver, DriverConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// midiproc - realtime MIDI bridge to an external process
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Copy input straight to output; no scheduling or filtering
    #[arg(long)]
    pass_through: bool,

    /// Config file (replaces ./midiproc.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// MIDI client name
    client_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .as_deref()
        .map(|p| expand_path(&p.to_string_lossy()));
    let (mut config, sources) = MidiprocConfig::load_with_sources_from(config_path.as_deref())
        .context("Failed to load config")?;
    if args.pass_through {
        config.bridge.pass_through = true;
    }
    if let Some(name) = args.client_name {
        config.driver.client_name = name;
    }

    let filter = EnvFilter::try_new(&config.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("midiproc {} starting", env!("CARGO_PKG_VERSION"));
    for file in &sources.files {
        info!("  config: {}", file.display());
    }
    for var in &sources.env_overrides {
        info!("  env override: {}", var);
    }
    info!("  outbound: {}", config.transport.outbound);
    info!("  inbound: {}", config.transport.inbound);
    if config.bridge.pass_through {
        info!("  pass-through mode: scheduling and filtering disabled");
    }

    let ctx = zmq::Context::new();
    let outbound = ZmqOutbound::bind(&ctx, &config.transport.outbound)
        .with_context(|| format!("Failed to bind {}", config.transport.outbound))?;
    let inbound = ZmqInbound::bind(&ctx, &config.transport.inbound)
        .with_context(|| format!("Failed to bind {}", config.transport.inbound))?;

    let bridge = Bridge::new(bridge_config(&config)).context("Failed to build bridge")?;
    let mut running = bridge
        .start(outbound, inbound)
        .context("Failed to start bridge workers")?;
    let realtime = running
        .take_realtime()
        .context("Realtime context already taken")?;

    let driver_config = DriverConfig {
        client_name: config.driver.client_name.clone(),
        sample_rate: config.driver.sample_rate,
        period_frames: config.driver.period_frames,
        input_port: config.driver.input_port.clone(),
        output_port: config.driver.output_port.clone(),
        ..DriverConfig::default()
    };
    let mut driver =
        ClockedMidiDriver::start(driver_config, realtime).context("Failed to start MIDI host")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
        _ = async {
            loop {
                ticker.tick().await;
                if running.is_stopping() {
                    break;
                }
            }
        } => warn!("Bridge worker exited, shutting down"),
    }

    // Detach the callback before the workers go away
    running.shutdown_flag().trigger();
    driver.stop();
    if driver.send_failures() > 0 {
        warn!("{} MIDI output writes failed", driver.send_failures());
    }

    let stats = running.shutdown();
    info!("Final stats: {}", serde_json::to_string(&stats)?);
    info!("midiproc shutdown complete");
    Ok(())
}

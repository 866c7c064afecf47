//! Bridge daemon
//!
//! Runs the engine on a serial device and logs a periodic status line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vebus_bridge::{BridgeConfig, VeBusEngine};

#[derive(Parser, Debug)]
#[command(name = "vebus-bridge", version, about = "VE.Bus inverter/charger bridge")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long, env = "VEBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration file
    #[arg(short, long)]
    device: Option<String>,

    /// Baud rate, overrides the configuration file
    #[arg(short, long)]
    baud: Option<u32>,

    /// Log filter, overrides the configuration file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,

    /// Status log period in seconds
    #[arg(long, default_value_t = 30)]
    status_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        BridgeConfig::load(args.config.as_deref()).context("configuration load failed")?;
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate().context("configuration invalid")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    if args.validate {
        info!(device = %config.device, baud = config.baud_rate, "configuration valid");
        println!(
            "{}",
            serde_json::to_string_pretty(&config).context("serialize configuration")?
        );
        return Ok(());
    }

    info!(
        device = %config.device,
        baud = config.baud_rate,
        "starting bridge"
    );
    let engine = VeBusEngine::start_serial(&config).context("engine start failed")?;

    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("install SIGTERM handler")?;
    let mut status = tokio::time::interval(Duration::from_secs(args.status_interval.max(1)));
    status.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            _ = sigterm.recv() => {
                info!("termination signal received");
                break;
            }
            _ = status.tick() => {
                let state = engine.snapshot_device_state();
                let stats = engine.snapshot_statistics();
                info!(
                    online = state.online,
                    battery_v = format_args!("{:.2}", state.dc.voltage),
                    battery_a = format_args!("{:.1}", state.dc.current),
                    mains_w = state.ac.power,
                    sent = stats.frames_sent,
                    received = stats.frames_received,
                    quality = format_args!("{:.2}", engine.communication_quality()),
                    "bus status"
                );
                if !engine.is_running() {
                    error!("driver task exited unexpectedly");
                    break;
                }
            }
        }
    }

    engine.stop().await;
    Ok(())
}

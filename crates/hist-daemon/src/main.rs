//! Historian bridge daemon entry point.
//!
//! Wires the fieldbus plane, the CDC core and the two egress sinks into a
//! running process: CLI and config parsing, interface discovery, thread
//! startup and signal-driven shutdown.

mod netif;
mod signals;
mod simulate;

use anyhow::{Context, Result};
use clap::Parser;
use hist_common::config::{BridgeConfig, ProviderKind};
use hist_core::bridge::Bridge;
use hist_fieldbus::SimulatedProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::signals::SignalHandler;

/// Bridge daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "hist-daemon",
    about = "High-speed historian PROFINET IO bridge - waits for a controller connection and streams value changes to InfluxDB and pub/sub",
    version,
    long_about = None
)]
struct Args {
    /// Path to a bridge configuration file (TOML).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ethernet interface name.
    #[arg(long, short = 'i', value_name = "INTERF")]
    interface: Option<String>,

    /// Station name announced on the fieldbus.
    #[arg(long, short = 's', value_name = "NAME")]
    station_name: Option<String>,

    /// Line name tag embedded in every measurement.
    #[arg(long, short = 'l', value_name = "NAME")]
    line_name: Option<String>,

    /// Controller name tag embedded in every measurement.
    #[arg(long, short = 'c', value_name = "NAME")]
    controller_name: Option<String>,

    /// Program name tag embedded in every measurement.
    #[arg(long, short = 'p', value_name = "NAME")]
    program_name: Option<String>,

    /// Prefix for measurement names and topics.
    #[arg(long, short = 'x', value_name = "PREFIX")]
    prefix: Option<String>,

    /// Line-protocol ingest host.
    #[arg(long, value_name = "HOST")]
    influx_host: Option<String>,

    /// Line-protocol ingest UDP port (0 disables the sink).
    #[arg(long, value_name = "PORT")]
    influx_port: Option<u16>,

    /// Pub/sub TCP port (0 disables the sink).
    #[arg(long, value_name = "PORT")]
    zmq_port: Option<u16>,

    /// Run against the in-memory provider with a demo feeder.
    #[arg(long)]
    simulated: bool,

    /// Increase verbosity (-v: debug, -vv: trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);
    info!(version = env!("CARGO_PKG_VERSION"), "starting historian bridge");

    let config = load_config(&args)?;
    let simulated = args.simulated || config.fieldbus.provider == ProviderKind::Simulated;

    if !simulated {
        let iface = netif::probe(&config.interface)
            .with_context(|| format!("Ethernet interface {} unusable", config.interface))?;
        info!(
            interface = %config.interface,
            ip = %iface.ip,
            netmask = %iface.netmask,
            gateway = %iface.gateway,
            mac = %iface.mac_string(),
            mtu = iface.mtu,
            "interface resolved"
        );
        warn!("PROFINET stack not linked into this build, falling back to the simulated provider");
    }

    debug!(
        station = %config.station_name,
        line = %config.line_name,
        controller = %config.controller_name,
        program = %config.program_name,
        prefix = %config.prefix,
        tick_us = config.tick_interval.as_micros() as u64,
        "device identity"
    );

    run_bridge(&config, simulated)
}

/// Initialize logging from the verbosity count.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = format!(
        "hist_daemon={level},hist_core={level},hist_fieldbus={level},hist_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or defaults, then apply CLI overrides.
fn load_config(args: &Args) -> Result<BridgeConfig> {
    let mut config = if let Some(config_path) = &args.config {
        BridgeConfig::from_file(config_path)
            .with_context(|| format!("failed to load config from {config_path:?}"))?
    } else {
        let default_path = PathBuf::from("config/default.toml");
        if default_path.exists() {
            info!(?default_path, "using default configuration file");
            BridgeConfig::from_file(&default_path)
                .with_context(|| format!("failed to load config from {default_path:?}"))?
        } else {
            BridgeConfig::default()
        }
    };

    if let Some(v) = &args.interface {
        config.interface = v.clone();
    }
    if let Some(v) = &args.station_name {
        config.station_name = v.clone();
    }
    if let Some(v) = &args.line_name {
        config.line_name = v.clone();
    }
    if let Some(v) = &args.controller_name {
        config.controller_name = v.clone();
    }
    if let Some(v) = &args.program_name {
        config.program_name = v.clone();
    }
    if let Some(v) = &args.prefix {
        config.prefix = v.clone();
    }
    if let Some(v) = &args.influx_host {
        config.influx.host = v.clone();
    }
    if let Some(v) = args.influx_port {
        config.influx.port = v;
    }
    if let Some(v) = args.zmq_port {
        config.zmq.port = v;
    }

    Ok(config)
}

/// Construct the bridge, run until a shutdown signal, tear down.
fn run_bridge(config: &BridgeConfig, simulated: bool) -> Result<()> {
    let provider = Arc::new(SimulatedProvider::new());
    let bridge = Bridge::new(config, Arc::clone(&provider) as _)
        .context("failed to construct bridge")?;
    let running = bridge.start().context("failed to start bridge")?;

    let feeder = if simulated {
        Some(
            simulate::start(running.device().clone(), Arc::clone(&provider))
                .context("failed to start demo feeder")?,
        )
    } else {
        None
    };

    let signal_handler = SignalHandler::new().context("failed to set up signal handlers")?;
    info!("bridge running, waiting for controller connection");

    while !signal_handler.shutdown_requested() {
        std::thread::sleep(Duration::from_millis(100));
    }
    info!("shutdown signal received");

    if let Some(feeder) = feeder {
        feeder.stop();
    }
    running.shutdown();
    info!("daemon shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["hist-daemon", "--simulated", "-v"]);
        assert!(args.simulated);
        assert_eq!(args.verbose, 1);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_short_flags_match_legacy_tool() {
        let args = Args::parse_from([
            "hist-daemon",
            "-i",
            "enp3s0",
            "-s",
            "station4",
            "-l",
            "Line4",
            "-c",
            "PLC4",
            "-p",
            "Prog4",
            "-x",
            "pg_",
        ]);
        assert_eq!(args.interface.as_deref(), Some("enp3s0"));
        assert_eq!(args.station_name.as_deref(), Some("station4"));
        assert_eq!(args.line_name.as_deref(), Some("Line4"));
        assert_eq!(args.controller_name.as_deref(), Some("PLC4"));
        assert_eq!(args.program_name.as_deref(), Some("Prog4"));
        assert_eq!(args.prefix.as_deref(), Some("pg_"));
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "hist-daemon",
            "-x",
            "pg_",
            "--influx-port",
            "9999",
            "--zmq-port",
            "0",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.prefix, "pg_");
        assert_eq!(config.influx.port, 9999);
        assert_eq!(config.zmq.port, 0);
        // Untouched fields keep their defaults
        assert_eq!(config.station_name, "historianio");
    }
}

//! l2bridged entry point.
//!
//! Loads the configuration, binds one UDP virtual wire per interface and
//! runs the bridge until SIGINT/SIGTERM.

use anyhow::{bail, Context};
use clap::Parser;
use l2bridged::bridge::Bridge;
use l2bridged::config::{BridgeConfig, SwitchCfg};
use l2bridged::daemon;
use l2bridged::link::udp;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// VLAN-aware learning bridge with simplified spanning tree
#[derive(Parser, Debug)]
#[command(name = "l2bridged")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Legacy switch<N>.cfg file to overlay on the configuration
    #[arg(long, conflicts_with = "switch_id")]
    switch_cfg: Option<PathBuf>,

    /// Load switch<N>.cfg for this switch from --config-dir
    #[arg(short = 's', long)]
    switch_id: Option<u32>,

    /// Directory holding switch<N>.cfg files
    #[arg(long, default_value = "./configs")]
    config_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run_daemon(args).await {
        Ok(()) => {
            info!("l2bridged: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, "l2bridged: Daemon exiting with error");
            ExitCode::FAILURE
        }
    }
}

/// Initialize structured logging
fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .compact(),
        )
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<BridgeConfig> {
    let legacy_path = match (&args.switch_cfg, args.switch_id) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(id)) => Some(SwitchCfg::locate(&args.config_dir, id)),
        (None, None) => None,
    };
    let legacy = legacy_path
        .map(|path| {
            SwitchCfg::load(&path).with_context(|| format!("loading {}", path.display()))
        })
        .transpose()?;

    match (&args.config, legacy) {
        (Some(path), legacy) => {
            let mut config = BridgeConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?;
            if let Some(legacy) = legacy {
                config.apply_switch_cfg(&legacy)?;
            }
            Ok(config)
        }
        (None, Some(legacy)) => Ok(BridgeConfig::from_switch_cfg(&legacy)?),
        (None, None) => bail!("no configuration given; use --config, --switch-cfg or --switch-id"),
    }
}

/// Main daemon loop
async fn run_daemon(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let endpoints = config.udp_endpoints()?;
    let mac = config.mac_address();

    let bridge = Bridge::new(config.bridge_id(), mac, config.port_roles()?)
        .with_blocked_ingress(config.bridge.blocked_ingress)
        .into_shared();

    let (source, sink) = udp::bind(&endpoints, mac)
        .await
        .context("binding interfaces")?;
    daemon::log_startup(&bridge, &sink);

    daemon::run(
        bridge,
        source,
        Arc::new(sink),
        config.hello_interval(),
        shutdown_signal(),
    )
    .await;
    Ok(())
}

/// Completes on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("l2bridged: Received SIGINT"),
        _ = terminate => info!("l2bridged: Received SIGTERM"),
    }
}

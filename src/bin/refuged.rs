//! Refuge Daemon - shelter monitoring server
//!
//! Serves supply status, updates and summaries over TCP and UDP, accepts
//! local control notices on a Unix socket, and broadcasts sensor alerts to
//! every connected client.
//!
//! # Usage
//!
//! ```bash
//! # OS-assigned ports (published to the ports file)
//! refuged
//!
//! # Fixed ports, either order
//! refuged -p udp 9001 -p tcp 9000
//!
//! # Custom control socket and capacity
//! REFUGE_SOCKET=/run/refuge.sock REFUGE_MAX_CLIENTS=10 refuged
//!
//! # Enable debug logging
//! RUST_LOG=refuged=debug refuged
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use refuged::alerts::{alert_channel, Workers};
use refuged::config::{DaemonConfig, PortSpec};
use refuged::eventlog::EventLog;
use refuged::server::MonitorServer;

/// Refuge daemon - shelter supplies and alert monitor
#[derive(Parser, Debug)]
#[command(name = "refuged", version, about)]
struct Args {
    /// Listen port for a protocol, e.g. `-p tcp 9000`. Repeatable; the last
    /// one per protocol wins. Unset ports are chosen by the OS.
    #[arg(
        short = 'p',
        long = "port",
        num_args = 2,
        value_names = ["PROTOCOL", "PORT"],
        action = ArgAction::Append
    )]
    ports: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let specs = PortSpec::from_pairs(args.ports.as_slice()).context("Invalid -p option")?;
    let mut config = DaemonConfig::load().context("Failed to load configuration")?;
    config.apply_ports(&specs);
    config.validate().context("Invalid configuration")?;

    run_daemon(config)
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("refuged=info".parse()?)
                .add_directive("refuge_core=info".parse()?)
                .add_directive("refuge_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Refuge daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let (alert_tx, alert_rx) = alert_channel();
    let server = MonitorServer::bind(&config, EventLog::new(&config.event_log), cancel_token.clone())
        .await
        .context("Failed to start server")?
        .with_alerts(alert_rx);

    let ports = server.ports();
    info!(
        tcp_port = ports.tcp_port,
        udp_port = ports.udp_port,
        ports_file = %config.ports_file.display(),
        "Sockets bound"
    );

    let workers = Workers::spawn(&config, alert_tx, &cancel_token);
    info!("Sensor and power workers started");

    let result = server.run().await;
    workers.shutdown().await;

    match result {
        Ok(state) => {
            info!(
                alerts = state.counters.total(),
                "Refuge daemon stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server error");
            Err(e.into())
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}

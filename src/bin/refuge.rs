//! Refuge - command-line client for the refuge daemon
//!
//! # Usage
//!
//! ```text
//! refuge status                      # Supply counters over TCP
//! refuge --udp status                # Same over UDP (identity attached)
//! refuge summary                     # Alerts, supplies and emergency info
//! refuge auth ubuntu                 # Check an identity
//! refuge update --fruits 5 --water -2
//! refuge listen                      # Print alerts and notices until disconnect
//! refuge notify "Generator test"     # Control-socket message
//! ```
//!
//! Ports default to the ones the daemon published when it started.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use refuge_client::{
    listen, notify, udp_request, udp_send, Broadcast, Endpoint, TcpSession, DEFAULT_TIMEOUT,
};
use refuge_core::SupplyDelta;
use refuge_protocol::{
    default_ports_path, ClientMessage, DaemonMessage, DEFAULT_SOCKET_PATH, SOCKET_ENV,
};

// ============================================================================
// CLI Arguments
// ============================================================================

/// Refuge client - query and update the shelter monitor
#[derive(Parser, Debug)]
#[command(name = "refuge", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Daemon host
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// TCP port (default: published port)
    #[arg(long, global = true)]
    tcp_port: Option<u16>,

    /// UDP port (default: published port)
    #[arg(long, global = true)]
    udp_port: Option<u16>,

    /// Port record written by the daemon
    #[arg(long, global = true)]
    ports_file: Option<PathBuf>,

    /// Send requests over UDP instead of TCP
    #[arg(long, global = true)]
    udp: bool,

    /// Identity attached to requests (default: this machine's host name)
    #[arg(long, global = true)]
    identity: Option<String>,

    /// Reply timeout in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show supply counters
    Status,
    /// Show alert counts, supplies and the last emergency event
    Summary,
    /// Authenticate with an identity
    Auth {
        /// Identity to present
        identity: String,
    },
    /// Add signed amounts to supply counters (floored at zero)
    Update(UpdateArgs),
    /// Stay connected over TCP and print every broadcast
    Listen,
    /// Send a message on the local control socket
    Notify {
        /// Message text
        text: String,

        /// Control socket path (default: $REFUGE_SOCKET or /tmp/refuge.sock)
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
struct UpdateArgs {
    #[arg(long, allow_hyphen_values = true)]
    meat: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    vegetables: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    fruits: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    water: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    antibiotics: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    analgesics: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    bandages: Option<i64>,
}

impl UpdateArgs {
    fn to_delta(&self) -> Result<SupplyDelta> {
        let fields = [
            ("food", "meat", self.meat),
            ("food", "vegetables", self.vegetables),
            ("food", "fruits", self.fruits),
            ("food", "water", self.water),
            ("medicine", "antibiotics", self.antibiotics),
            ("medicine", "analgesics", self.analgesics),
            ("medicine", "bandages", self.bandages),
        ];

        let mut delta = SupplyDelta::default();
        for (category, item, value) in fields {
            if let Some(value) = value {
                delta.set(category, item, value)?;
            }
        }
        if delta.is_empty() {
            bail!("Nothing to update; pass at least one amount, e.g. --fruits 5");
        }
        Ok(delta)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("refuge_client=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout_ms);

    match &args.command {
        Command::Notify { text, socket } => {
            let socket = socket.clone().unwrap_or_else(control_socket_path);
            notify(&socket, text)
                .await
                .with_context(|| format!("Failed to notify {}", socket.display()))?;
            println!("Control message sent");
            Ok(())
        }
        Command::Listen => {
            let endpoint = endpoint(&args)?;
            let addr = endpoint.tcp_addr().await?;
            let mut session = TcpSession::connect(addr, timeout).await?;
            run_listen(&mut session).await
        }
        Command::Status => {
            let reply = request(&args, ClientMessage::status(), timeout).await?;
            print_reply(&reply)
        }
        Command::Summary => {
            let reply = request(&args, ClientMessage::summary(), timeout).await?;
            print_reply(&reply)
        }
        Command::Auth { identity } => {
            let message = ClientMessage::authenticate(identity.clone());
            let reply = request(&args, message, timeout).await?;
            print_reply(&reply)
        }
        Command::Update(update) => {
            let message = ClientMessage::update(update.to_delta()?);
            send_update(&args, message, timeout).await?;
            println!("Update sent");
            Ok(())
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn endpoint(args: &Args) -> Result<Endpoint> {
    let ports_file = args.ports_file.clone().unwrap_or_else(default_ports_path);
    Ok(Endpoint::discover(
        args.host.clone(),
        args.tcp_port,
        args.udp_port,
        &ports_file,
    )?)
}

fn control_socket_path() -> PathBuf {
    std::env::var(SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// This machine's host name, used as the default identity.
fn local_identity() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn identity(args: &Args) -> String {
    args.identity.clone().unwrap_or_else(local_identity)
}

/// Sends a request on the chosen transport and waits for the reply.
async fn request(args: &Args, message: ClientMessage, timeout: Duration) -> Result<DaemonMessage> {
    let endpoint = endpoint(args)?;

    if args.udp {
        // UDP requests without an identity are dropped by the daemon
        let message = if message.hostname.is_some() {
            message
        } else {
            message.with_hostname(identity(args))
        };
        let addr = endpoint.udp_addr().await?;
        debug!(addr = %addr, command = %message.message, "UDP request");
        return Ok(udp_request(addr, &message, timeout).await?);
    }

    let addr = endpoint.tcp_addr().await?;
    let mut session = TcpSession::connect(addr, timeout).await?;
    let message = match &args.identity {
        Some(identity) if message.hostname.is_none() => message.with_hostname(identity.clone()),
        _ => message,
    };
    Ok(session.request(&message).await?)
}

/// Sends an update; the daemon never replies to one.
async fn send_update(args: &Args, message: ClientMessage, timeout: Duration) -> Result<()> {
    let endpoint = endpoint(args)?;

    if args.udp {
        let addr = endpoint.udp_addr().await?;
        udp_send(addr, &message.with_hostname(identity(args))).await?;
        return Ok(());
    }

    let addr = endpoint.tcp_addr().await?;
    let mut session = TcpSession::connect(addr, timeout).await?;
    session.send(&message).await?;
    Ok(())
}

fn print_reply(reply: &DaemonMessage) -> Result<()> {
    let json = serde_json::to_string_pretty(reply).context("Failed to format reply")?;
    println!("{json}");
    Ok(())
}

async fn run_listen(session: &mut TcpSession) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    println!("Listening on {} (Ctrl+C to stop)", session.addr());
    listen(session, &cancel, |broadcast| match broadcast {
        Broadcast::Alert(text) => {
            println!("ALERT: {text}");
            ControlFlow::Continue(())
        }
        Broadcast::Disconnect => {
            println!("Daemon requested disconnect");
            ControlFlow::Break(())
        }
        Broadcast::Message(message) => {
            match serde_json::to_string(&message) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Unprintable message: {e}"),
            }
            ControlFlow::Continue(())
        }
    })
    .await?;
    Ok(())
}

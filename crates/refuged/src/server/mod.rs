//! Event loop for the refuge daemon.
//!
//! The server:
//! - Accepts TCP clients and registers them in the bounded registry
//! - Receives UDP datagrams and remembers their senders as peers
//! - Accepts Unix control connections and broadcasts the disconnect notice
//! - Consumes alert records from the sensor worker and broadcasts them
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//!  TcpListener   UdpSocket   UnixListener   alert rx   CancellationToken
//!       │            │            │             │              │
//!       └────────────┴─────┬──────┴─────────────┴──────────────┘
//!                          ▼
//!                ┌───────────────────┐      ┌──────────────────┐
//!                │  select! (biased) │◀─────│ TCP reader tasks │
//!                └─────────┬─────────┘      └──────────────────┘
//!                          │ one LoopEvent at a time
//!                          ▼
//!        MonitorState · ClientRegistry · Dispatcher · EventLog
//! ```
//!
//! Every handler runs to completion in the loop task before the next
//! event is taken, so registry and state mutations are serialized without
//! locks. Reader tasks only move bytes.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-peer failures are logged and never stop the loop
//! - Only setup failures (bind, socket creation) are returned as errors

mod connection;
mod control;
mod dispatch;

pub use connection::{spawn_reader, ClientEvent, CloseReason};
pub use control::{handle_control, spawn_control_reader, ControlMessage, CONTROL_READ_TIMEOUT};
pub use dispatch::{Dispatcher, Origin, Outcome};

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use refuge_core::AlertRecord;
use refuge_protocol::{decode_request, PortInfo, MAX_MESSAGE_SIZE};
use tokio::net::{TcpListener, TcpStream, UdpSocket, UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{deliver_alert, AlertTargets};
use crate::config::DaemonConfig;
use crate::eventlog::EventLog;
use crate::registry::{ClientId, ClientRegistry, TcpClient, UdpPeer, UdpRegistration};
use crate::state::MonitorState;

/// Buffered events from reader tasks.
const CLIENT_EVENT_CAPACITY: usize = 256;

/// Buffered control messages.
const CONTROL_CHANNEL_CAPACITY: usize = 8;

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {transport} socket on {addr}: {error}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        error: String,
    },

    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },
}

/// One readiness event taken from the wait set.
enum LoopEvent {
    Shutdown,
    TcpAccept(io::Result<(TcpStream, SocketAddr)>),
    Datagram(io::Result<(usize, SocketAddr)>),
    ControlAccept(io::Result<UnixStream>),
    Control(ControlMessage),
    Alert(Option<AlertRecord>),
    Client(ClientEvent),
}

/// The monitoring server: sockets, registry and state owned by one loop.
pub struct MonitorServer {
    tcp: TcpListener,
    udp: UdpSocket,
    control: UnixListener,
    control_path: PathBuf,
    ports_file: PathBuf,
    ports: PortInfo,

    cancel_token: CancellationToken,
    alerts: Option<mpsc::Receiver<AlertRecord>>,
    client_tx: mpsc::Sender<ClientEvent>,
    client_rx: mpsc::Receiver<ClientEvent>,
    control_tx: mpsc::Sender<ControlMessage>,
    control_rx: mpsc::Receiver<ControlMessage>,

    state: MonitorState,
    registry: ClientRegistry,
    dispatcher: Dispatcher,
    log: EventLog,
    udp_peer_ttl: Option<std::time::Duration>,
    udp_buf: Vec<u8>,
    next_client: u64,
}

impl MonitorServer {
    /// Binds the TCP, UDP and Unix sockets described by `config`.
    ///
    /// Unset ports are assigned by the OS. A stale control socket file is
    /// removed first; one held by a running daemon is an error. The bound ports are published to `config.ports_file`.
    pub async fn bind(
        config: &DaemonConfig,
        log: EventLog,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let tcp = bind_tcp(config.bind_address, config.tcp_port.unwrap_or(0)).await?;
        let udp = bind_udp(config.bind_address, config.udp_port.unwrap_or(0)).await?;
        let control = bind_control(&config.control_socket)?;

        let ports = PortInfo {
            tcp_port: local_port(tcp.local_addr(), "TCP", config.bind_address)?,
            udp_port: local_port(udp.local_addr(), "UDP", config.bind_address)?,
        };

        let (client_tx, client_rx) = mpsc::channel(CLIENT_EVENT_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);

        let server = Self {
            tcp,
            udp,
            control,
            control_path: config.control_socket.clone(),
            ports_file: config.ports_file.clone(),
            ports,
            cancel_token,
            alerts: None,
            client_tx,
            client_rx,
            control_tx,
            control_rx,
            state: MonitorState::new(),
            registry: ClientRegistry::new(config.max_clients),
            dispatcher: Dispatcher::new(config.admin_identity.clone()),
            log,
            udp_peer_ttl: config.udp_peer_ttl(),
            udp_buf: vec![0u8; MAX_MESSAGE_SIZE],
            next_client: 0,
        };
        server.publish_ports();

        Ok(server)
    }

    /// Adds the alert channel to the wait set.
    #[must_use]
    pub fn with_alerts(mut self, alerts: mpsc::Receiver<AlertRecord>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Ports actually bound.
    pub fn ports(&self) -> PortInfo {
        self.ports
    }

    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Runs the loop until the cancellation token fires.
    ///
    /// Returns the final state once sockets and files are cleaned up.
    pub async fn run(mut self) -> Result<MonitorState, ServerError> {
        info!(
            tcp_port = self.ports.tcp_port,
            udp_port = self.ports.udp_port,
            control = %self.control_path.display(),
            capacity = self.registry.capacity(),
            "Monitor server listening"
        );
        self.log.append(&format!(
            "Server started on TCP port {} and UDP port {}",
            self.ports.tcp_port, self.ports.udp_port
        ));

        loop {
            let event = tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => LoopEvent::Shutdown,

                result = self.tcp.accept() => LoopEvent::TcpAccept(result),

                result = self.udp.recv_from(&mut self.udp_buf) => LoopEvent::Datagram(result),

                result = self.control.accept() => {
                    LoopEvent::ControlAccept(result.map(|(stream, _)| stream))
                }

                Some(message) = self.control_rx.recv() => LoopEvent::Control(message),

                record = recv_optional(&mut self.alerts) => LoopEvent::Alert(record),

                Some(event) = self.client_rx.recv() => LoopEvent::Client(event),
            };

            match event {
                LoopEvent::Shutdown => {
                    info!("Server shutdown requested");
                    break;
                }
                LoopEvent::TcpAccept(result) => self.on_tcp_accept(result).await,
                LoopEvent::Datagram(result) => self.on_datagram(result).await,
                LoopEvent::ControlAccept(result) => match result {
                    Ok(stream) => spawn_control_reader(stream, self.control_tx.clone()),
                    Err(e) => error!(error = %e, "Failed to accept control connection"),
                },
                LoopEvent::Control(message) => {
                    handle_control(&message, &mut self.registry, &self.log).await;
                }
                LoopEvent::Alert(Some(record)) => {
                    let targets = AlertTargets {
                        registry: &mut self.registry,
                        udp: &self.udp,
                        udp_peer_ttl: self.udp_peer_ttl,
                    };
                    deliver_alert(&record, &mut self.state, targets, &self.log).await;
                }
                LoopEvent::Alert(None) => {
                    warn!("Alert channel closed, no further sensor alerts");
                    self.alerts = None;
                }
                LoopEvent::Client(ClientEvent::Message { id, payload }) => {
                    self.on_tcp_message(id, &payload).await;
                }
                LoopEvent::Client(ClientEvent::Closed { id, reason }) => {
                    self.on_tcp_closed(id, reason).await;
                }
            }
        }

        self.cleanup().await;
        Ok(self.state)
    }

    // ========================================================================
    // TCP
    // ========================================================================

    async fn on_tcp_accept(&mut self, result: io::Result<(TcpStream, SocketAddr)>) {
        let (stream, addr) = match result {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept TCP connection");
                return;
            }
        };

        if self.registry.is_tcp_full() {
            warn!(
                client = %addr,
                max = self.registry.capacity(),
                "Registry full, closing TCP connection"
            );
            self.log
                .append(&format!("Connection from {} rejected: maximum clients reached", addr.ip()));
            drop(stream);
            return;
        }

        let id = ClientId(self.next_client);
        self.next_client += 1;

        let (reader, writer) = stream.into_split();
        let reader = spawn_reader(id, reader, self.client_tx.clone());
        let client = TcpClient::new(id, addr, writer).with_reader(reader);

        match self.registry.add_tcp(client) {
            Ok(total) => {
                info!(client = %id, addr = %addr, total, "TCP client registered");
                self.log
                    .append(&format!("TCP client connected: {}, total: {}", addr.ip(), total));
            }
            Err(rejected) => rejected.close().await,
        }
    }

    async fn on_tcp_message(&mut self, id: ClientId, payload: &[u8]) {
        let Some(addr) = self.registry.tcp_client(id).map(TcpClient::addr) else {
            debug!(client = %id, "Message from unregistered client ignored");
            return;
        };

        let request = match decode_request(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(client = %id, error = %e, "Malformed TCP message dropped");
                return;
            }
        };

        let outcome = self
            .dispatcher
            .dispatch(Origin::Tcp(addr), request, &mut self.state, &self.log);

        if let Some(reply) = outcome.reply {
            match reply.to_bytes() {
                Ok(bytes) => {
                    if let Some(client) = self.registry.tcp_client_mut(id) {
                        if let Err(e) = client.send(&bytes).await {
                            debug!(client = %id, error = %e, "Failed to send reply");
                        }
                    }
                }
                Err(e) => error!(error = %e, "Failed to encode reply"),
            }
        }

        if outcome.close {
            if let Some(client) = self.registry.remove_tcp(id) {
                self.log.append(&format!(
                    "TCP client {} closed after failed authentication, total: {}",
                    addr.ip(),
                    self.registry.tcp_count()
                ));
                client.close().await;
            }
        }
    }

    async fn on_tcp_closed(&mut self, id: ClientId, reason: CloseReason) {
        let Some(client) = self.registry.remove_tcp(id) else {
            return;
        };
        let total = self.registry.tcp_count();

        match &reason {
            CloseReason::Eof => info!(client = %id, total, "TCP client disconnected"),
            CloseReason::Error(e) => warn!(client = %id, error = %e, total, "TCP client read failed"),
        }
        self.log.append(&format!(
            "TCP client disconnected: {}, total: {}",
            client.addr().ip(),
            total
        ));
        client.close().await;
    }

    // ========================================================================
    // UDP
    // ========================================================================

    async fn on_datagram(&mut self, result: io::Result<(usize, SocketAddr)>) {
        let (len, addr) = match result {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "UDP receive failed");
                return;
            }
        };
        let payload = self.udp_buf.get(..len).unwrap_or_default();

        let request = match decode_request(payload) {
            Ok(request) => request,
            Err(e) => {
                if e.is_well_formed_json() {
                    self.register_udp(addr);
                }
                warn!(peer = %addr, error = %e, "Malformed UDP datagram dropped");
                return;
            }
        };
        self.register_udp(addr);

        let outcome = self
            .dispatcher
            .dispatch(Origin::Udp(addr), request, &mut self.state, &self.log);

        if let Some(reply) = outcome.reply {
            match reply.to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = self.udp.send_to(&bytes, addr).await {
                        warn!(peer = %addr, error = %e, "Failed to send UDP reply");
                    }
                }
                Err(e) => error!(error = %e, "Failed to encode reply"),
            }
        }
    }

    fn register_udp(&mut self, addr: SocketAddr) {
        let now = Instant::now();
        match self.registry.add_udp(UdpPeer::seen_at(addr, now)) {
            UdpRegistration::Added(total) => {
                info!(peer = %addr, total, "UDP peer registered");
                self.log
                    .append(&format!("UDP client connected: {}, total: {}", addr.ip(), total));
            }
            UdpRegistration::Duplicate => self.registry.touch_udp(addr, now),
            UdpRegistration::Full => {
                warn!(peer = %addr, max = self.registry.capacity(), "UDP registry full");
            }
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    fn publish_ports(&self) {
        if let Err(e) = self.ports.write_to(&self.ports_file) {
            warn!(path = %self.ports_file.display(), error = %e, "Failed to publish ports");
        }
    }

    /// Closes all clients and removes the socket and port files.
    async fn cleanup(&mut self) {
        for client in self.registry.drain_tcp() {
            client.close().await;
        }

        remove_file_quietly(&self.control_path, "socket");
        remove_file_quietly(&self.ports_file, "ports");

        self.log.append("Server stopped");
        info!("Server cleanup complete");
    }
}

/// Receives from an optional channel; pends forever when there is none.
async fn recv_optional<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn remove_file_quietly(path: &Path, kind: &'static str) {
    if !path.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), kind, error = %e, "Failed to remove file");
    }
}

// ============================================================================
// Socket Setup
// ============================================================================

/// Returns the IPv4 fallback for the unspecified IPv6 address.
fn ipv4_fallback(addr: IpAddr) -> Option<IpAddr> {
    match addr {
        IpAddr::V6(v6) if v6.is_unspecified() => Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        _ => None,
    }
}

async fn bind_tcp(ip: IpAddr, port: u16) -> Result<TcpListener, ServerError> {
    let primary = SocketAddr::new(ip, port);
    match TcpListener::bind(primary).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            let Some(fallback) = ipv4_fallback(ip) else {
                return Err(bind_error("TCP", primary, &e));
            };
            warn!(addr = %primary, error = %e, "IPv6 TCP bind failed, falling back to IPv4");
            let fallback = SocketAddr::new(fallback, port);
            TcpListener::bind(fallback)
                .await
                .map_err(|e| bind_error("TCP", fallback, &e))
        }
    }
}

async fn bind_udp(ip: IpAddr, port: u16) -> Result<UdpSocket, ServerError> {
    let primary = SocketAddr::new(ip, port);
    match UdpSocket::bind(primary).await {
        Ok(socket) => Ok(socket),
        Err(e) => {
            let Some(fallback) = ipv4_fallback(ip) else {
                return Err(bind_error("UDP", primary, &e));
            };
            warn!(addr = %primary, error = %e, "IPv6 UDP bind failed, falling back to IPv4");
            let fallback = SocketAddr::new(fallback, port);
            UdpSocket::bind(fallback)
                .await
                .map_err(|e| bind_error("UDP", fallback, &e))
        }
    }
}

fn bind_control(path: &Path) -> Result<UnixListener, ServerError> {
    let setup_error = |e: io::Error| ServerError::SocketSetup {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    // A socket that still accepts belongs to a running daemon; only a
    // refused connect marks the file as stale.
    if path.exists() {
        match std::os::unix::net::UnixStream::connect(path) {
            Ok(_) => {
                return Err(ServerError::SocketSetup {
                    path: path.to_path_buf(),
                    error: "control socket in use by a running daemon".to_string(),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!(path = %path.display(), "Removing stale control socket");
                std::fs::remove_file(path).map_err(setup_error)?;
            }
            Err(e) => return Err(setup_error(e)),
        }
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(setup_error)?;
        }
    }

    UnixListener::bind(path).map_err(setup_error)
}

fn local_port(
    addr: io::Result<SocketAddr>,
    transport: &'static str,
    ip: IpAddr,
) -> Result<u16, ServerError> {
    addr.map(|a| a.port())
        .map_err(|e| bind_error(transport, SocketAddr::new(ip, 0), &e))
}

fn bind_error(transport: &'static str, addr: SocketAddr, error: &io::Error) -> ServerError {
    ServerError::Bind {
        transport,
        addr,
        error: error.to_string(),
    }
}

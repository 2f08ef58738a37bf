//! Connections to the refuge daemon.
//!
//! This module provides:
//! - [`Endpoint`]: where the daemon listens, from flags or the published port record
//! - [`TcpSession`]: a stream connection for requests and broadcasts
//! - [`udp_request`] / [`udp_send`]: one datagram out, optionally one back
//! - [`notify`]: one message on the local control socket
//! - [`listen`]: print-style loop over everything the daemon pushes
//!
//! Messages are one JSON object per read, so every send is a single write
//! and every receive a single read.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` in this module.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;

use refuge_protocol::{send_control, ClientMessage, DaemonMessage, PortInfo, MAX_MESSAGE_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// How long to wait for a connection or a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// Endpoint
// ============================================================================

/// Host and ports of a running daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub tcp_port: u16,
    pub udp_port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, ports: PortInfo) -> Self {
        Self {
            host: host.into(),
            tcp_port: ports.tcp_port,
            udp_port: ports.udp_port,
        }
    }

    /// Builds an endpoint from explicit ports, reading `ports_file` only
    /// for the ones not given.
    pub fn discover(
        host: impl Into<String>,
        tcp_port: Option<u16>,
        udp_port: Option<u16>,
        ports_file: &Path,
    ) -> Result<Self> {
        let host = host.into();
        if let (Some(tcp_port), Some(udp_port)) = (tcp_port, udp_port) {
            return Ok(Self {
                host,
                tcp_port,
                udp_port,
            });
        }

        let published = PortInfo::read_from(ports_file).map_err(|e| ClientError::PortDiscovery {
            path: ports_file.to_path_buf(),
            error: e.to_string(),
        })?;
        debug!(path = %ports_file.display(), ?published, "Read published ports");

        Ok(Self {
            host,
            tcp_port: tcp_port.unwrap_or(published.tcp_port),
            udp_port: udp_port.unwrap_or(published.udp_port),
        })
    }

    pub async fn tcp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.tcp_port).await
    }

    pub async fn udp_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.udp_port).await
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{host}:{port}");
    let mut addrs = match tokio::net::lookup_host(target.clone()).await {
        Ok(addrs) => addrs,
        Err(e) => {
            return Err(ClientError::Connect {
                addr: target,
                error: e.to_string(),
            })
        }
    };
    addrs.next().ok_or(ClientError::Resolve(target))
}

// ============================================================================
// Broadcasts
// ============================================================================

/// Something the daemon pushed without being asked, or a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    /// The daemon asked clients to treat the session as ended
    Disconnect,

    /// A JSON document
    Message(DaemonMessage),

    /// A raw alert text
    Alert(String),
}

impl Broadcast {
    /// Sorts one read's worth of bytes. Alerts are plain text, not JSON.
    pub fn classify(bytes: &[u8]) -> Self {
        match DaemonMessage::from_slice(bytes) {
            Ok(message) if message.is_disconnect() => Self::Disconnect,
            Ok(message) => Self::Message(message),
            Err(_) => Self::Alert(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

// ============================================================================
// TCP Session
// ============================================================================

/// A TCP connection to the daemon.
#[derive(Debug)]
pub struct TcpSession {
    stream: TcpStream,
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpSession {
    /// Connects to `addr`, giving up after `timeout`.
    pub async fn connect(addr: SocketAddr, timeout_after: Duration) -> Result<Self> {
        let stream = timeout(timeout_after, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout {
                addr,
                timeout: timeout_after,
            })?
            .map_err(|e| ClientError::Connect {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;

        info!(addr = %addr, "Connected to daemon");
        Ok(Self {
            stream,
            addr,
            timeout: timeout_after,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends one message.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let bytes = message.to_bytes()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Waits up to the session timeout for one read.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        match timeout(self.timeout, read_once(&mut self.stream)).await {
            Ok(Ok(Some(bytes))) => Ok(bytes),
            Ok(Ok(None)) => Err(ClientError::Closed),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ClientError::Timeout {
                addr: self.addr,
                timeout: self.timeout,
            }),
        }
    }

    /// Sends `message` and decodes the reply.
    pub async fn request(&mut self, message: &ClientMessage) -> Result<DaemonMessage> {
        self.send(message).await?;
        let bytes = self.recv().await?;
        Ok(DaemonMessage::from_slice(&bytes)?)
    }

    /// Waits without a timeout for the next push. `None` once the daemon closes.
    pub async fn next_broadcast(&mut self) -> Result<Option<Broadcast>> {
        Ok(read_once(&mut self.stream)
            .await?
            .map(|bytes| Broadcast::classify(&bytes)))
    }
}

async fn read_once(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some(buf))
}

/// Handles broadcasts until `on_broadcast` breaks, the daemon closes, or
/// `cancel` fires.
pub async fn listen<F>(
    session: &mut TcpSession,
    cancel: &CancellationToken,
    mut on_broadcast: F,
) -> Result<()>
where
    F: FnMut(Broadcast) -> ControlFlow<()>,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Listen cancelled");
                return Ok(());
            }
            next = session.next_broadcast() => next?,
        };

        let Some(broadcast) = next else {
            info!(addr = %session.addr(), "Daemon closed the connection");
            return Ok(());
        };
        if on_broadcast(broadcast).is_break() {
            return Ok(());
        }
    }
}

// ============================================================================
// UDP
// ============================================================================

async fn udp_socket_for(addr: SocketAddr) -> Result<UdpSocket> {
    let local: IpAddr = match addr {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let socket = UdpSocket::bind(SocketAddr::new(local, 0)).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

/// Sends one datagram and expects no reply.
pub async fn udp_send(addr: SocketAddr, message: &ClientMessage) -> Result<()> {
    let socket = udp_socket_for(addr).await?;
    socket.send(&message.to_bytes()?).await?;
    debug!(addr = %addr, "Datagram sent");
    Ok(())
}

/// Sends one datagram and decodes the first reply.
///
/// The daemon drops UDP requests without an identity, so `message` should
/// carry one.
pub async fn udp_request(
    addr: SocketAddr,
    message: &ClientMessage,
    timeout_after: Duration,
) -> Result<DaemonMessage> {
    let socket = udp_socket_for(addr).await?;
    socket.send(&message.to_bytes()?).await?;

    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    let n = timeout(timeout_after, socket.recv(&mut buf))
        .await
        .map_err(|_| ClientError::Timeout {
            addr,
            timeout: timeout_after,
        })??;
    let reply = buf.get(..n).unwrap_or_default();
    Ok(DaemonMessage::from_slice(reply)?)
}

// ============================================================================
// Control Socket
// ============================================================================

/// Writes `text` to the daemon's control socket and disconnects.
pub async fn notify(socket_path: &Path, text: &str) -> Result<()> {
    send_control(socket_path, text)
        .await
        .map_err(|e| ClientError::Connect {
            addr: socket_path.display().to_string(),
            error: e.to_string(),
        })?;
    info!(socket = %socket_path.display(), "Control message sent");
    Ok(())
}

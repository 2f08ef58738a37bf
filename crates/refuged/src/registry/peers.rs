//! Registered peer handles.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::AbortHandle;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Bound on a single send to a TCP client.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write half of a TCP client connection.
pub type ClientWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// Process-local identity of an accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp-{}", self.0)
    }
}

// ============================================================================
// TCP Client
// ============================================================================

/// An accepted TCP connection as seen by the registry.
///
/// The registry owns the write half. The read half lives in a reader task
/// that is aborted when the client is dropped.
pub struct TcpClient {
    id: ClientId,
    addr: SocketAddr,
    writer: ClientWriter,
    reader: Option<AbortHandle>,
}

impl TcpClient {
    pub fn new<W>(id: ClientId, addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Sync + Unpin + 'static,
    {
        Self {
            id,
            addr,
            writer: Box::new(writer),
            reader: None,
        }
    }

    /// Ties the reader task's lifetime to this client.
    #[must_use]
    pub fn with_reader(mut self, reader: AbortHandle) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Writes `bytes` and flushes, bounded by [`WRITE_TIMEOUT`].
    pub async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let write = async {
            self.writer.write_all(bytes).await?;
            self.writer.flush().await
        };
        match timeout(WRITE_TIMEOUT, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        }
    }

    /// Shuts down the write half and stops the reader.
    pub async fn close(mut self) {
        if let Err(e) = self.shutdown_writer().await {
            debug!(client = %self.id, addr = %self.addr, error = %e, "Closing TCP client failed");
        }
    }

    /// Shuts down the write half, bounded by [`WRITE_TIMEOUT`].
    async fn shutdown_writer(&mut self) -> io::Result<()> {
        match timeout(WRITE_TIMEOUT, self.writer.shutdown()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "shutdown timed out")),
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpClient")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// UDP Peer
// ============================================================================

/// Address family of a UDP peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Self::V4,
            SocketAddr::V6(_) => Self::V6,
        }
    }
}

/// A UDP sender remembered for broadcasts. Identity is the remote address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpPeer {
    addr: SocketAddr,
    family: AddressFamily,
    last_seen: Instant,
}

impl UdpPeer {
    pub fn new(addr: SocketAddr) -> Self {
        Self::seen_at(addr, Instant::now())
    }

    pub fn seen_at(addr: SocketAddr, at: Instant) -> Self {
        Self {
            addr,
            family: AddressFamily::of(&addr),
            last_seen: at,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Updates the activity timestamp used for liveness expiry.
    pub fn touch(&mut self, at: Instant) {
        self.last_seen = at;
    }

    /// Returns true if the peer has been silent for longer than `ttl`.
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }
}

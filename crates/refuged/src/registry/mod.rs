//! Client registry.
//!
//! Keeps two bounded, ordered lists: accepted TCP clients and UDP peers
//! that have sent at least one valid datagram. Both share the same
//! capacity. Insertion beyond capacity is refused and handed back to the
//! caller, which is responsible for closing a refused TCP connection.
//!
//! Broadcasts are best effort. A failed send is logged and never causes
//! deregistration; TCP clients leave the registry only through the read
//! path (EOF or read error) or an explicit close.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` in this module
//! - Send failures are returned or logged, never raised

mod bounded;
mod peers;

pub use bounded::BoundedList;
pub use peers::{AddressFamily, ClientId, ClientWriter, TcpClient, UdpPeer, WRITE_TIMEOUT};

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of offering a UDP peer to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpRegistration {
    /// Peer appended; carries the new count
    Added(usize),

    /// A peer with the same address is already registered
    Duplicate,

    /// Registry is at capacity
    Full,
}

/// Bounded registry of TCP clients and UDP peers.
#[derive(Debug)]
pub struct ClientRegistry {
    tcp: BoundedList<TcpClient>,
    udp: BoundedList<UdpPeer>,
}

impl ClientRegistry {
    /// Creates a registry holding at most `capacity` peers per transport.
    pub fn new(capacity: usize) -> Self {
        Self {
            tcp: BoundedList::new(capacity),
            udp: BoundedList::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tcp.capacity()
    }

    // ------------------------------------------------------------------------
    // TCP
    // ------------------------------------------------------------------------

    /// Registers `client`, returning the new count, or the client if full.
    pub fn add_tcp(&mut self, client: TcpClient) -> Result<usize, TcpClient> {
        self.tcp.push(client)
    }

    /// Removes the client with `id`, keeping the order of the others.
    pub fn remove_tcp(&mut self, id: ClientId) -> Option<TcpClient> {
        self.tcp.remove_first(|client| client.id() == id)
    }

    /// Returns true when another TCP client would be refused.
    pub fn is_tcp_full(&self) -> bool {
        self.tcp.is_full()
    }

    pub fn tcp_client(&self, id: ClientId) -> Option<&TcpClient> {
        self.tcp.find(|client| client.id() == id)
    }

    pub fn tcp_client_mut(&mut self, id: ClientId) -> Option<&mut TcpClient> {
        self.tcp.find_mut(|client| client.id() == id)
    }

    pub fn tcp_count(&self) -> usize {
        self.tcp.len()
    }

    /// Registered client ids in registration order.
    pub fn tcp_ids(&self) -> Vec<ClientId> {
        self.tcp.iter().map(TcpClient::id).collect()
    }

    /// Sends `bytes` to every TCP client. Returns how many sends succeeded.
    pub async fn broadcast_tcp(&mut self, bytes: &[u8]) -> usize {
        let mut delivered = 0;
        for client in self.tcp.iter_mut() {
            match client.send(bytes).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(client = %client.id(), addr = %client.addr(), error = %e, "Broadcast to TCP client failed");
                }
            }
        }
        delivered
    }

    /// Removes every TCP client, in registration order.
    pub fn drain_tcp(&mut self) -> Vec<TcpClient> {
        self.tcp.drain()
    }

    // ------------------------------------------------------------------------
    // UDP
    // ------------------------------------------------------------------------

    /// Registers `peer` unless its address is already known.
    ///
    /// An existing entry is never replaced.
    pub fn add_udp(&mut self, peer: UdpPeer) -> UdpRegistration {
        if self.udp.find(|known| known.addr() == peer.addr()).is_some() {
            return UdpRegistration::Duplicate;
        }
        match self.udp.push(peer) {
            Ok(count) => UdpRegistration::Added(count),
            Err(_) => UdpRegistration::Full,
        }
    }

    /// Updates the activity time of a registered peer.
    pub fn touch_udp(&mut self, addr: SocketAddr, at: Instant) {
        if let Some(peer) = self.udp.find_mut(|peer| peer.addr() == addr) {
            peer.touch(at);
        }
    }

    /// Removes the peer at `addr`, keeping the order of the others.
    pub fn remove_udp(&mut self, addr: SocketAddr) -> Option<UdpPeer> {
        self.udp.remove_first(|peer| peer.addr() == addr)
    }

    /// Removes peers silent for longer than `ttl`. Returns the removed peers.
    pub fn prune_udp(&mut self, ttl: Duration, now: Instant) -> Vec<UdpPeer> {
        self.udp.remove_all(|peer| peer.is_expired(ttl, now))
    }

    pub fn udp_count(&self) -> usize {
        self.udp.len()
    }

    /// Registered peer addresses in registration order.
    pub fn udp_addrs(&self) -> Vec<SocketAddr> {
        self.udp.iter().map(UdpPeer::addr).collect()
    }

    /// Sends `bytes` to every UDP peer through `socket`. Returns how many sends succeeded.
    pub async fn broadcast_udp(&self, socket: &UdpSocket, bytes: &[u8]) -> usize {
        let mut delivered = 0;
        for peer in self.udp.iter() {
            match socket.send_to(bytes, peer.addr()).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(peer = %peer.addr(), error = %e, "Broadcast to UDP peer failed");
                }
            }
        }
        delivered
    }
}

//! Refuge Client - talking to the refuge daemon
//!
//! Used by the `refuge` command-line tool. The daemon serves the same
//! commands over TCP and UDP; UDP requests must carry an identity and get
//! their reply as a single datagram. Broadcasts (alerts, disconnect
//! notices) only reach connected TCP clients and UDP peers the daemon has
//! heard from.

pub mod client;
pub mod error;

pub use client::{
    listen, notify, udp_request, udp_send, Broadcast, Endpoint, TcpSession, DEFAULT_TIMEOUT,
};
pub use error::{ClientError, Result};

//! Error types for the refuge client.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` in this module.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use refuge_protocol::ParseError;
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors raised while talking to the daemon.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon could not be reached.
    ///
    /// Usually the daemon is not running or listens on another port.
    #[error("Failed to connect to daemon at {addr}: {error}")]
    Connect { addr: String, error: String },

    /// No ports were given and the published port record is unreadable.
    #[error("Cannot find daemon ports in {path} (is refuged running?): {error}")]
    PortDiscovery { path: PathBuf, error: String },

    /// The host name does not resolve to any address.
    #[error("Cannot resolve {0}")]
    Resolve(String),

    /// No reply arrived in time.
    ///
    /// The daemon sends no reply to `update`, to malformed messages, and to
    /// UDP requests without an identity.
    #[error("No reply from {addr} within {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },

    /// The daemon closed the connection.
    #[error("Connection closed by daemon")]
    Closed,

    /// A message could not be encoded or a reply could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

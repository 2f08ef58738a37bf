//! Refuge Protocol - Wire protocol for daemon communication
//!
//! Every message is one UTF-8 JSON object with no length prefix or
//! delimiter; a message is expected to arrive in a single read of at most
//! [`MAX_MESSAGE_SIZE`] bytes. This crate provides request decoding for the
//! daemon, message builders for clients, the response documents, the port
//! record the daemon publishes after binding, and the control-socket notice.

pub mod control;
pub mod message;
pub mod parse;
pub mod ports;

pub use control::{send_control, DEFAULT_SOCKET_PATH, SOCKET_ENV};
pub use message::{
    AlertSummary, AuthOutcome, ClientMessage, Command, DaemonMessage, Request, SummaryDocument,
};
pub use parse::{decode_request, ParseError};
pub use ports::{default_ports_path, PortInfo};

/// Maximum size of a single message in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024;

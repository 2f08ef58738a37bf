//! Refuge Daemon - Shelter monitoring server
//!
//! This crate provides the core infrastructure for the refuge daemon:
//! - `server` - Event loop multiplexing TCP, UDP, the Unix control socket and alerts
//! - `registry` - Bounded bookkeeping of connected TCP clients and UDP peers
//! - `alerts` - Sensor and power-outage workers feeding the alert bridge
//! - `state` - Supplies, alert counters and emergency info owned by the loop
//! - `config` - Daemon configuration (defaults, TOML file, environment, CLI)
//! - `eventlog` - Append-only event log file
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      refuged daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ TcpListener  │  │  UdpSocket   │  │  UnixListener    │   │
//! │  └──────┬───────┘  └──────┬───────┘  └────────┬─────────┘   │
//! │         │                 │                   │             │
//! │         ▼                 ▼                   ▼             │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │              MonitorServer (select! loop)           │◀─┐ │
//! │  │   MonitorState · ClientRegistry · Dispatcher        │  │ │
//! │  └──────────────────────────▲──────────────────────────┘  │ │
//! │                             │ ClientEvent                 │ │
//! │  ┌──────────────────────────┴───┐   ┌─────────────────────┴┐│
//! │  │  TCP reader tasks (per peer) │   │ sensor worker (mpsc) ││
//! │  └──────────────────────────────┘   └──────────────────────┘│
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the loop task touches the registry and the state, so neither
//! needs a lock.
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate does not panic:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod alerts;
pub mod config;
pub mod eventlog;
pub mod registry;
pub mod server;
pub mod state;

//! Port record published by the daemon.
//!
//! After binding, the daemon writes the ports it actually listens on so
//! local clients can find it without being told. The record is removed on
//! shutdown.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The TCP and UDP ports the daemon is serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub tcp_port: u16,
    pub udp_port: u16,
}

impl PortInfo {
    /// Writes the record as JSON, creating parent directories as needed.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    /// Reads a record written by [`PortInfo::write_to`].
    pub fn read_from(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Returns the default location of the port record.
pub fn default_ports_path() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("refuge")
        .join("ports.json")
}

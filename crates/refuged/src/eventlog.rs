//! Append-only event log.
//!
//! One line per event, `[%Y-%m-%d %H:%M:%S] <text>`, in local time. The
//! file and its directory are created on first write. Write failures are
//! reported through `tracing` and never interrupt the caller.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use refuge_core::format_timestamp;
use tracing::warn;

/// Handle to the event log file.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    /// Creates a log that appends to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Creates a log that discards every entry.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one timestamped line.
    pub fn append(&self, text: &str) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_line(path, &format_line(text)) {
            warn!(path = %path.display(), error = %e, "Failed to write event log");
        }
    }
}

fn format_line(text: &str) -> String {
    format!("[{}] {}\n", format_timestamp(&Local::now()), text)
}

fn write_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

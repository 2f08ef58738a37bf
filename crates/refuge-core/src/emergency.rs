//! Last-known emergency state.

use std::fmt;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::truncate_at_char_boundary;

/// Maximum length of the stored event description in bytes.
pub const MAX_EVENT_LEN: usize = 100;

/// Timestamp layout used for keepalives and the event log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats `at` with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Snapshot of the most recent keepalive and event.
///
/// Last writer wins; no history is kept. Both client requests and
/// sensor alerts overwrite it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyInfo {
    /// When the last event was recorded (`TIMESTAMP_FORMAT`)
    pub last_keepalived: String,

    /// Description of the last event
    pub last_event: String,
}

impl EmergencyInfo {
    /// Overwrites both fields.
    pub fn record<Tz>(&mut self, at: &DateTime<Tz>, event: &str)
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        self.last_keepalived = format_timestamp(at);
        let mut event = event.to_string();
        truncate_at_char_boundary(&mut event, MAX_EVENT_LEN);
        self.last_event = event;
    }

    /// Overwrites both fields using the local clock.
    pub fn record_now(&mut self, event: &str) {
        self.record(&Local::now(), event);
    }

    /// Returns true if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.last_keepalived.is_empty() && self.last_event.is_empty()
    }
}

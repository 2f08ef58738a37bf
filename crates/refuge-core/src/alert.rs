//! Entry-point alerts.
//!
//! Alert records arrive as free text from the sensor worker. The entry point
//! they refer to is decoded once, when the record is built, so handlers never
//! re-scan the text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::truncate_at_char_boundary;

/// Maximum length of an alert record in bytes.
pub const MAX_ALERT_LEN: usize = 1024;

// ============================================================================
// Entry Points
// ============================================================================

/// One of the four monitored shelter entrances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    North,
    South,
    East,
    West,
}

impl EntryPoint {
    /// Keyword scan order. A text naming several entries credits the first one here.
    pub const PRIORITY: [EntryPoint; 4] = [
        EntryPoint::North,
        EntryPoint::South,
        EntryPoint::East,
        EntryPoint::West,
    ];

    /// The uppercase keyword searched for in alert text.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::North => "NORTH",
            Self::South => "SOUTH",
            Self::East => "EAST",
            Self::West => "WEST",
        }
    }

    /// Returns the first entry whose keyword occurs in `text`, in `PRIORITY` order.
    pub fn detect(text: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|entry| text.contains(entry.keyword()))
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for EntryPoint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PRIORITY
            .into_iter()
            .find(|entry| entry.keyword().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownEntry {
                name: s.to_string(),
            })
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Per-entry alert tallies since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertCounters {
    north: u64,
    south: u64,
    east: u64,
    west: u64,
}

impl AlertCounters {
    /// Increments the counter for `entry` by exactly one.
    pub fn increment(&mut self, entry: EntryPoint) {
        let slot = self.slot_mut(entry);
        *slot = slot.saturating_add(1);
    }

    /// Returns the current count for `entry`.
    pub fn get(&self, entry: EntryPoint) -> u64 {
        match entry {
            EntryPoint::North => self.north,
            EntryPoint::South => self.south,
            EntryPoint::East => self.east,
            EntryPoint::West => self.west,
        }
    }

    /// Sum over all entries.
    pub fn total(&self) -> u64 {
        EntryPoint::PRIORITY
            .into_iter()
            .fold(0u64, |acc, entry| acc.saturating_add(self.get(entry)))
    }

    fn slot_mut(&mut self, entry: EntryPoint) -> &mut u64 {
        match entry {
            EntryPoint::North => &mut self.north,
            EntryPoint::South => &mut self.south,
            EntryPoint::East => &mut self.east,
            EntryPoint::West => &mut self.west,
        }
    }
}

// ============================================================================
// Alert Record
// ============================================================================

/// A single alert notification, consumed exactly once by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    text: String,
    entry: Option<EntryPoint>,
}

impl AlertRecord {
    /// Builds a record, truncating to `MAX_ALERT_LEN` bytes and decoding the entry.
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        truncate_at_char_boundary(&mut text, MAX_ALERT_LEN);
        let entry = EntryPoint::detect(&text);
        Self { text, entry }
    }

    /// Builds a record from raw channel bytes (invalid UTF-8 is replaced).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let end = bytes.len().min(MAX_ALERT_LEN);
        let raw = bytes.get(..end).unwrap_or_default();
        Self::new(String::from_utf8_lossy(raw).trim_end_matches('\0'))
    }

    /// The raw alert text, broadcast verbatim.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The entry point credited for this alert, if any keyword matched.
    pub fn entry(&self) -> Option<EntryPoint> {
        self.entry
    }

    /// Returns true if the record carries no text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_single_keyword() {
        assert_eq!(
            EntryPoint::detect("Alert of possible infection in EAST ENTRY"),
            Some(EntryPoint::East)
        );
        assert_eq!(EntryPoint::detect("WEST"), Some(EntryPoint::West));
    }

    #[test]
    fn test_detect_first_match_wins() {
        assert_eq!(
            EntryPoint::detect("Breach detected at NORTH and SOUTH gates"),
            Some(EntryPoint::North)
        );
        // Priority order, not position in the text
        assert_eq!(
            EntryPoint::detect("WEST then EAST then SOUTH"),
            Some(EntryPoint::South)
        );
    }

    #[test]
    fn test_detect_no_match() {
        assert_eq!(EntryPoint::detect("Power restored"), None);
        // Keywords are case sensitive
        assert_eq!(EntryPoint::detect("north gate"), None);
        assert_eq!(EntryPoint::detect(""), None);
    }

    #[test]
    fn test_entry_from_str() {
        assert_eq!("north".parse::<EntryPoint>().unwrap(), EntryPoint::North);
        assert_eq!("WEST".parse::<EntryPoint>().unwrap(), EntryPoint::West);
        assert!(matches!(
            "up".parse::<EntryPoint>(),
            Err(DomainError::UnknownEntry { .. })
        ));
    }

    #[test]
    fn test_counters_increment_one() {
        let mut counters = AlertCounters::default();
        counters.increment(EntryPoint::North);
        counters.increment(EntryPoint::North);
        counters.increment(EntryPoint::West);

        assert_eq!(counters.get(EntryPoint::North), 2);
        assert_eq!(counters.get(EntryPoint::South), 0);
        assert_eq!(counters.get(EntryPoint::East), 0);
        assert_eq!(counters.get(EntryPoint::West), 1);
        assert_eq!(counters.total(), 3);
    }

    #[test]
    fn test_record_decodes_entry_once() {
        let record = AlertRecord::new("Breach detected at NORTH and SOUTH gates");
        assert_eq!(record.entry(), Some(EntryPoint::North));
        assert_eq!(record.text(), "Breach detected at NORTH and SOUTH gates");
    }

    #[test]
    fn test_record_truncates() {
        let record = AlertRecord::new("x".repeat(MAX_ALERT_LEN + 50));
        assert_eq!(record.text().len(), MAX_ALERT_LEN);
    }

    #[test]
    fn test_record_from_bytes() {
        let record = AlertRecord::from_bytes(b"SOUTH ENTRY alert\0\0\0");
        assert_eq!(record.text(), "SOUTH ENTRY alert");
        assert_eq!(record.entry(), Some(EntryPoint::South));

        assert!(AlertRecord::from_bytes(b"").is_empty());
    }
}

//! Monitor state owned by the event loop.
//!
//! `MonitorState` is the single context object passed `&mut` into every
//! handler. The loop task is its only writer; workers reach it solely by
//! sending alert records through the bridge channel.

use refuge_core::{AlertCounters, AlertRecord, EmergencyInfo, EntryPoint, SupplyDelta, SupplyState};
use refuge_protocol::{AlertSummary, SummaryDocument};

/// Supplies, alert tallies and the last emergency event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub supplies: SupplyState,
    pub counters: AlertCounters,
    pub emergency: EmergencyInfo,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the alert as the last event and credits its entry point.
    ///
    /// Returns the credited entry, if the text named one.
    pub fn apply_alert(&mut self, record: &AlertRecord) -> Option<EntryPoint> {
        self.emergency.record_now(record.text());
        let entry = record.entry();
        if let Some(entry) = entry {
            self.counters.increment(entry);
        }
        entry
    }

    /// Adds each present delta to its counter, flooring at zero.
    pub fn apply_update(&mut self, delta: &SupplyDelta) {
        self.supplies.apply(delta);
    }

    /// Overwrites the keepalive timestamp and last event.
    pub fn record_event(&mut self, text: &str) {
        self.emergency.record_now(text);
    }

    /// Snapshot of the supply counters.
    pub fn supplies(&self) -> SupplyState {
        self.supplies
    }

    /// Builds the summary document.
    pub fn summary(&self) -> SummaryDocument {
        SummaryDocument {
            alerts: AlertSummary::from(&self.counters),
            supplies: self.supplies,
            emergency: self.emergency.clone(),
        }
    }
}

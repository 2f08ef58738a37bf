//! Refuge Core - Shared domain types for shelter monitoring
//!
//! This crate provides the domain types shared between the daemon
//! (refuged), the wire protocol and the command-line client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod alert;
pub mod emergency;
pub mod error;
pub mod supplies;

// Re-exports for convenience
pub use alert::{AlertCounters, AlertRecord, EntryPoint, MAX_ALERT_LEN};
pub use emergency::{format_timestamp, EmergencyInfo, MAX_EVENT_LEN, TIMESTAMP_FORMAT};
pub use error::{DomainError, DomainResult};
pub use supplies::{
    apply_delta, FoodDelta, FoodSupply, MedicineDelta, MedicineSupply, SupplyDelta, SupplyState,
};

/// Shortens `text` to at most `max` bytes without splitting a UTF-8 character.
pub(crate) fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

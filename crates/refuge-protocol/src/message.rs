//! Protocol message types for daemon communication.

use refuge_core::{AlertCounters, EmergencyInfo, EntryPoint, SupplyDelta, SupplyState};
use serde::{Deserialize, Serialize};

use crate::parse::ParseError;

/// Wire names of the supported commands.
pub mod names {
    pub const AUTHENTICATE: &str = "authenticateme";
    pub const STATUS: &str = "status";
    pub const UPDATE: &str = "update";
    pub const SUMMARY: &str = "summary";
    pub const DISCONNECT: &str = "disconnect";
}

// ============================================================================
// Requests (daemon side)
// ============================================================================

/// A command decoded from the `message` field of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Compare the identity field against the admin identity
    Authenticate,

    /// Return a supply snapshot
    Status,

    /// Apply signed deltas to supply counters
    Update(SupplyDelta),

    /// Return alerts, supplies and emergency info in one document
    Summary,

    /// Any other `message` value
    Unknown(String),
}

impl Command {
    /// Short label used in logs.
    pub fn label(&self) -> &str {
        match self {
            Self::Authenticate => names::AUTHENTICATE,
            Self::Status => names::STATUS,
            Self::Update(_) => names::UPDATE,
            Self::Summary => names::SUMMARY,
            Self::Unknown(name) => name,
        }
    }
}

/// A decoded request. Requests carry no session; each one stands alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// What the client asked for
    pub command: Command,

    /// The inline identity field, if present and a string
    pub hostname: Option<String>,
}

// ============================================================================
// Client Messages (client side)
// ============================================================================

/// Outbound request built by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Command name
    pub message: String,

    /// Identity string (required for UDP requests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Food/medicine deltas for `update`
    #[serde(flatten)]
    pub delta: SupplyDelta,
}

impl ClientMessage {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            hostname: None,
            delta: SupplyDelta::default(),
        }
    }

    /// Creates an authentication request.
    pub fn authenticate(identity: impl Into<String>) -> Self {
        Self::new(names::AUTHENTICATE).with_hostname(identity)
    }

    /// Creates a status request.
    pub fn status() -> Self {
        Self::new(names::STATUS)
    }

    /// Creates an update request.
    pub fn update(delta: SupplyDelta) -> Self {
        Self {
            delta,
            ..Self::new(names::UPDATE)
        }
    }

    /// Creates a summary request.
    pub fn summary() -> Self {
        Self::new(names::SUMMARY)
    }

    /// Attaches the identity field.
    #[must_use]
    pub fn with_hostname(mut self, identity: impl Into<String>) -> Self {
        self.hostname = Some(identity.into());
        self
    }

    /// Serializes to the wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        serde_json::to_vec(self).map_err(|e| ParseError::Encode(e.to_string()))
    }
}

// ============================================================================
// Daemon Messages (responses and notices)
// ============================================================================

/// Result of an `authenticateme` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    AuthSuccess,
    AuthFailure,
}

/// Alert tallies as they appear in the summary document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub north_entry: u64,
    pub east_entry: u64,
    pub west_entry: u64,
    pub south_entry: u64,
}

impl From<&AlertCounters> for AlertSummary {
    fn from(counters: &AlertCounters) -> Self {
        Self {
            north_entry: counters.get(EntryPoint::North),
            east_entry: counters.get(EntryPoint::East),
            west_entry: counters.get(EntryPoint::West),
            south_entry: counters.get(EntryPoint::South),
        }
    }
}

/// Response to a `summary` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub alerts: AlertSummary,
    pub supplies: SupplyState,
    pub emergency: EmergencyInfo,
}

/// Messages sent from the daemon to clients.
///
/// Variants are untagged so each serializes to exactly the documented
/// response shape. Alert broadcasts are not JSON and never pass through
/// this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaemonMessage {
    /// `{"alerts": {...}, "supplies": {...}, "emergency": {...}}`
    Summary(SummaryDocument),

    /// `{"food": {...}, "medicine": {...}}`
    Supplies(SupplyState),

    /// `{"message": "auth_success" | "auth_failure"}`
    Auth { message: AuthOutcome },

    /// Any other `{"message": ...}` notice, e.g. `disconnect`
    Notice { message: String },
}

impl DaemonMessage {
    /// Creates an authentication response.
    pub fn auth(success: bool) -> Self {
        let message = if success {
            AuthOutcome::AuthSuccess
        } else {
            AuthOutcome::AuthFailure
        };
        Self::Auth { message }
    }

    /// Creates the notice broadcast when a control message ends the session.
    pub fn disconnect() -> Self {
        Self::Notice {
            message: names::DISCONNECT.to_string(),
        }
    }

    /// Returns true for the disconnect notice.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Notice { message } if message == names::DISCONNECT)
    }

    /// Serializes to the wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        serde_json::to_vec(self).map_err(|e| ParseError::Encode(e.to_string()))
    }

    /// Parses a daemon message received by a client.
    pub fn from_slice(payload: &[u8]) -> Result<Self, ParseError> {
        serde_json::from_slice(payload).map_err(|e| ParseError::InvalidJson(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_shape() {
        let json = String::from_utf8(DaemonMessage::auth(false).to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"message":"auth_failure"}"#);

        let json = String::from_utf8(DaemonMessage::auth(true).to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"message":"auth_success"}"#);
    }

    #[test]
    fn test_disconnect_notice() {
        let msg = DaemonMessage::disconnect();
        let json = String::from_utf8(msg.to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"message":"disconnect"}"#);

        let parsed = DaemonMessage::from_slice(json.as_bytes()).unwrap();
        assert!(parsed.is_disconnect());
    }

    #[test]
    fn test_summary_document_shape() {
        let mut counters = AlertCounters::default();
        counters.increment(EntryPoint::North);

        let doc = SummaryDocument {
            alerts: AlertSummary::from(&counters),
            ..Default::default()
        };
        let json = serde_json::to_value(DaemonMessage::Summary(doc)).unwrap();

        assert_eq!(json["alerts"]["north_entry"], 1);
        assert_eq!(json["alerts"]["south_entry"], 0);
        assert_eq!(json["supplies"]["food"]["fruits"], 0);
        assert_eq!(json["emergency"]["last_event"], "");
    }

    #[test]
    fn test_untagged_parse_picks_right_variant() {
        let status = br#"{"food":{"meat":1,"vegetables":2,"fruits":3,"water":4},
            "medicine":{"antibiotics":5,"analgesics":6,"bandages":7}}"#;
        match DaemonMessage::from_slice(status).unwrap() {
            DaemonMessage::Supplies(state) => {
                assert_eq!(state.food.fruits, 3);
                assert_eq!(state.medicine.bandages, 7);
            }
            other => panic!("expected supplies, got {other:?}"),
        }

        let auth = br#"{"message":"auth_success"}"#;
        assert_eq!(
            DaemonMessage::from_slice(auth).unwrap(),
            DaemonMessage::auth(true)
        );
    }

    #[test]
    fn test_client_message_serialization() {
        let mut delta = SupplyDelta::default();
        delta.set("food", "fruits", 5).unwrap();
        let msg = ClientMessage::update(delta).with_hostname("ubuntu");

        let json: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(json["message"], "update");
        assert_eq!(json["hostname"], "ubuntu");
        assert_eq!(json["food"]["fruits"], 5);
        assert!(json.get("medicine").is_none());
    }

    #[test]
    fn test_status_omits_hostname() {
        let json = String::from_utf8(ClientMessage::status().to_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"message":"status"}"#);
    }
}

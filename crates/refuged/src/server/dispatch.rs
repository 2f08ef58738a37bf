//! Request dispatch.
//!
//! Executes one decoded request against the monitor state and decides the
//! reply. Requests carry no session: `authenticateme` only answers, it does
//! not grant anything to later requests.
//!
//! The two network transports enforce identity differently:
//! - TCP `update` is applied unconditionally
//! - UDP requests must carry an identity field, and UDP `update` is applied
//!   only when that identity matches the admin identity
//!
//! A failed TCP `authenticateme` also ends that client's session.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use refuge_protocol::{Command, DaemonMessage, Request};
use tracing::{debug, info, warn};

use crate::eventlog::EventLog;
use crate::state::MonitorState;

/// Transport and address a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Tcp(SocketAddr),
    Udp(SocketAddr),
}

impl Origin {
    pub fn addr(&self) -> SocketAddr {
        match self {
            Self::Tcp(addr) | Self::Udp(addr) => *addr,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.addr().ip()
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, Self::Udp(_))
    }

    fn transport(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "TCP",
            Self::Udp(_) => "UDP",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} client {}", self.transport(), self.ip())
    }
}

/// What the loop should do after a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Response to send back to the origin
    pub reply: Option<DaemonMessage>,

    /// Deregister and close the origin (TCP only)
    pub close: bool,
}

impl Outcome {
    fn none() -> Self {
        Self::default()
    }

    fn reply(message: DaemonMessage) -> Self {
        Self {
            reply: Some(message),
            close: false,
        }
    }
}

/// Executes requests against the monitor state.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    admin_identity: String,
}

impl Dispatcher {
    pub fn new(admin_identity: impl Into<String>) -> Self {
        Self {
            admin_identity: admin_identity.into(),
        }
    }

    pub fn admin_identity(&self) -> &str {
        &self.admin_identity
    }

    fn is_admin(&self, identity: Option<&str>) -> bool {
        identity == Some(self.admin_identity.as_str())
    }

    /// Executes `request` from `origin`, returning the reply and close decision.
    pub fn dispatch(
        &self,
        origin: Origin,
        request: Request,
        state: &mut MonitorState,
        log: &EventLog,
    ) -> Outcome {
        debug!(origin = %origin, command = request.command.label(), "Dispatching request");

        if origin.is_udp() && request.hostname.is_none() {
            warn!(origin = %origin, "UDP request without hostname dropped");
            return Outcome::none();
        }

        let hostname = request.hostname.as_deref();

        match request.command {
            Command::Authenticate => self.authenticate(origin, hostname, log),

            Command::Status => {
                let text = format!("Status request from {origin}");
                state.record_event(&text);
                log.append(&text);
                info!(origin = %origin, "Status request");
                Outcome::reply(DaemonMessage::Supplies(state.supplies()))
            }

            Command::Update(delta) => {
                let text = match origin {
                    Origin::Tcp(_) => format!("Update request from {origin}"),
                    Origin::Udp(_) if self.is_admin(hostname) => {
                        format!("Update request from authenticated {origin}")
                    }
                    Origin::Udp(_) => {
                        log.append(&format!("Update request from not authenticated {origin}"));
                        warn!(origin = %origin, hostname = ?hostname, "Unauthenticated update ignored");
                        return Outcome::none();
                    }
                };
                state.apply_update(&delta);
                state.record_event(&text);
                log.append(&text);
                info!(origin = %origin, "Supplies updated");
                Outcome::none()
            }

            Command::Summary => {
                log.append(&format!("Summary request from {origin}"));
                info!(origin = %origin, "Summary request");
                Outcome::reply(DaemonMessage::Summary(state.summary()))
            }

            Command::Unknown(name) => {
                log.append(&format!("Invalid request received from {origin}"));
                warn!(origin = %origin, command = %name, "Invalid request");
                Outcome::none()
            }
        }
    }

    fn authenticate(&self, origin: Origin, hostname: Option<&str>, log: &EventLog) -> Outcome {
        let Some(identity) = hostname else {
            debug!(origin = %origin, "authenticateme without hostname ignored");
            return Outcome::none();
        };

        if self.is_admin(Some(identity)) {
            log.append(&format!("Authentication succeeded for {origin}"));
            info!(origin = %origin, "Client authenticated");
            Outcome::reply(DaemonMessage::auth(true))
        } else {
            log.append(&format!("Authentication failed for {origin}"));
            warn!(origin = %origin, identity = %identity, "Client authentication failed");
            Outcome {
                reply: Some(DaemonMessage::auth(false)),
                close: !origin.is_udp(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refuge_core::{EntryPoint, SupplyDelta, SupplyState};
    use refuge_protocol::decode_request;

    fn tcp() -> Origin {
        Origin::Tcp("127.0.0.1:40000".parse().unwrap())
    }

    fn udp() -> Origin {
        Origin::Udp("127.0.0.1:40001".parse().unwrap())
    }

    fn run(origin: Origin, json: &str, state: &mut MonitorState) -> Outcome {
        let dispatcher = Dispatcher::new("ubuntu");
        let request = decode_request(json.as_bytes()).unwrap();
        dispatcher.dispatch(origin, request, state, &EventLog::disabled())
    }

    fn supplies(outcome: Outcome) -> SupplyState {
        match outcome.reply {
            Some(DaemonMessage::Supplies(state)) => state,
            other => panic!("expected supplies, got {other:?}"),
        }
    }

    #[test]
    fn test_update_then_status() {
        let mut state = MonitorState::new();

        let outcome = run(tcp(), r#"{"message":"update","food":{"fruits":5}}"#, &mut state);
        assert_eq!(outcome, Outcome::none());

        let snapshot = supplies(run(tcp(), r#"{"message":"status"}"#, &mut state));
        assert_eq!(snapshot.food.meat, 0);
        assert_eq!(snapshot.food.vegetables, 0);
        assert_eq!(snapshot.food.fruits, 5);
        assert_eq!(snapshot.food.water, 0);
    }

    #[test]
    fn test_update_clamps_at_zero() {
        let mut state = MonitorState::new();
        run(tcp(), r#"{"message":"update","food":{"fruits":5}}"#, &mut state);
        run(tcp(), r#"{"message":"update","food":{"fruits":-100}}"#, &mut state);

        assert_eq!(state.supplies.food.fruits, 0);
    }

    #[test]
    fn test_authenticate_replies() {
        let mut state = MonitorState::new();

        let denied = run(
            tcp(),
            r#"{"message":"authenticateme","hostname":"not-admin"}"#,
            &mut state,
        );
        assert_eq!(denied.reply, Some(DaemonMessage::auth(false)));
        assert!(denied.close);

        let granted = run(
            tcp(),
            r#"{"message":"authenticateme","hostname":"ubuntu"}"#,
            &mut state,
        );
        assert_eq!(granted.reply, Some(DaemonMessage::auth(true)));
        assert!(!granted.close);
    }

    #[test]
    fn test_authenticate_without_hostname_is_silent() {
        let mut state = MonitorState::new();
        let outcome = run(tcp(), r#"{"message":"authenticateme"}"#, &mut state);
        assert_eq!(outcome, Outcome::none());
    }

    #[test]
    fn test_udp_failed_auth_keeps_peer() {
        let mut state = MonitorState::new();
        let outcome = run(
            udp(),
            r#"{"message":"authenticateme","hostname":"guest"}"#,
            &mut state,
        );
        assert_eq!(outcome.reply, Some(DaemonMessage::auth(false)));
        assert!(!outcome.close);
    }

    #[test]
    fn test_tcp_update_needs_no_identity() {
        let mut state = MonitorState::new();
        run(
            tcp(),
            r#"{"message":"update","hostname":"intruder","medicine":{"bandages":3}}"#,
            &mut state,
        );
        assert_eq!(state.supplies.medicine.bandages, 3);
    }

    #[test]
    fn test_udp_update_checks_identity() {
        let mut state = MonitorState::new();

        run(
            udp(),
            r#"{"message":"update","hostname":"intruder","medicine":{"bandages":3}}"#,
            &mut state,
        );
        assert_eq!(state.supplies.medicine.bandages, 0);
        assert!(state.emergency.is_empty());

        run(
            udp(),
            r#"{"message":"update","hostname":"ubuntu","medicine":{"bandages":3}}"#,
            &mut state,
        );
        assert_eq!(state.supplies.medicine.bandages, 3);
        assert_eq!(
            state.emergency.last_event,
            "Update request from authenticated UDP client 127.0.0.1"
        );
    }

    #[test]
    fn test_udp_without_hostname_dropped() {
        let mut state = MonitorState::new();
        let outcome = run(udp(), r#"{"message":"status"}"#, &mut state);
        assert_eq!(outcome, Outcome::none());
        assert!(state.emergency.is_empty());

        let outcome = run(udp(), r#"{"message":"status","hostname":"anyone"}"#, &mut state);
        assert!(matches!(outcome.reply, Some(DaemonMessage::Supplies(_))));
    }

    #[test]
    fn test_status_records_keepalive() {
        let mut state = MonitorState::new();
        run(tcp(), r#"{"message":"status"}"#, &mut state);

        assert_eq!(state.emergency.last_event, "Status request from TCP client 127.0.0.1");
        assert!(!state.emergency.last_keepalived.is_empty());
    }

    #[test]
    fn test_summary_reply() {
        let mut state = MonitorState::new();
        state.counters.increment(EntryPoint::West);
        let mut delta = SupplyDelta::default();
        delta.set("food", "water", 12).unwrap();
        state.apply_update(&delta);

        let outcome = run(tcp(), r#"{"message":"summary"}"#, &mut state);
        match outcome.reply {
            Some(DaemonMessage::Summary(doc)) => {
                assert_eq!(doc.alerts.west_entry, 1);
                assert_eq!(doc.supplies.food.water, 12);
            }
            other => panic!("expected summary, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_no_reply() {
        let mut state = MonitorState::new();
        assert_eq!(run(tcp(), r#"{"message":"reboot"}"#, &mut state), Outcome::none());
        assert_eq!(
            run(udp(), r#"{"message":"reboot","hostname":"ubuntu"}"#, &mut state),
            Outcome::none()
        );
    }

    #[test]
    fn test_event_log_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("refuge.log"));
        let dispatcher = Dispatcher::new("ubuntu");
        let mut state = MonitorState::new();

        for json in [
            r#"{"message":"status"}"#,
            r#"{"message":"summary"}"#,
            r#"{"message":"dance"}"#,
        ] {
            let request = decode_request(json.as_bytes()).unwrap();
            dispatcher.dispatch(tcp(), request, &mut state, &log);
        }

        let contents = std::fs::read_to_string(dir.path().join("refuge.log")).unwrap();
        assert!(contents.contains("Status request from TCP client 127.0.0.1"));
        assert!(contents.contains("Summary request from TCP client 127.0.0.1"));
        assert!(contents.contains("Invalid request received from TCP client 127.0.0.1"));
    }
}

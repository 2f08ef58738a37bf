//! Alert bridge.
//!
//! Two workers run beside the event loop:
//! - the sensor worker sends [`AlertRecord`]s through an `mpsc` channel
//!   that the loop includes in its wait set
//! - the power-outage worker reports failures over the Unix control socket
//!
//! Neither worker touches the registry or the monitor state. The loop
//! consumes each record exactly once with [`deliver_alert`].

pub mod outage;
pub mod sensor;

pub use outage::{run_outage_worker, OutageSchedule, OUTAGE_MESSAGE};
pub use sensor::{alert_text, run_sensor_worker, SensorArray, SENSOR_NAMES};

use std::time::Duration;

use refuge_core::AlertRecord;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::eventlog::EventLog;
use crate::registry::ClientRegistry;
use crate::state::MonitorState;

/// Buffered alert records between the workers and the loop.
pub const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Creates the alert channel.
pub fn alert_channel() -> (mpsc::Sender<AlertRecord>, mpsc::Receiver<AlertRecord>) {
    mpsc::channel(ALERT_CHANNEL_CAPACITY)
}

/// Handles to the running workers.
#[derive(Debug)]
pub struct Workers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Spawns the sensor and power-outage workers.
    ///
    /// Both stop when `parent` is cancelled or when [`Workers::shutdown`] is called.
    pub fn spawn(
        config: &DaemonConfig,
        alerts: mpsc::Sender<AlertRecord>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (outage_min, outage_max) = config.outage_window();

        let sensor = tokio::spawn(run_sensor_worker(
            SensorArray::new(config.temperature_threshold),
            config.sensor_interval(),
            alerts,
            cancel.clone(),
        ));
        let outage = tokio::spawn(run_outage_worker(
            OutageSchedule::new(outage_min, outage_max),
            config.control_socket.clone(),
            cancel.clone(),
        ));

        Self {
            cancel,
            handles: vec![sensor, outage],
        }
    }

    /// Stops both workers and waits for them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task failed");
            }
        }
    }
}

/// Where alert broadcasts go.
pub struct AlertTargets<'a> {
    pub registry: &'a mut ClientRegistry,
    pub udp: &'a UdpSocket,
    pub udp_peer_ttl: Option<Duration>,
}

/// Consumes one alert record.
///
/// Records the text as the last emergency event, broadcasts it verbatim
/// (not JSON) to every TCP client and UDP peer, and credits the first
/// entry point named in the text. Empty records are ignored.
pub async fn deliver_alert(
    record: &AlertRecord,
    state: &mut MonitorState,
    targets: AlertTargets<'_>,
    log: &EventLog,
) {
    if record.is_empty() {
        return;
    }

    log.append(record.text());
    let entry = state.apply_alert(record);

    if let Some(ttl) = targets.udp_peer_ttl {
        for peer in targets.registry.prune_udp(ttl, Instant::now()) {
            debug!(peer = %peer.addr(), "Expired silent UDP peer");
        }
    }

    let bytes = record.text().as_bytes();
    let tcp = targets.registry.broadcast_tcp(bytes).await;
    let udp = targets.registry.broadcast_udp(targets.udp, bytes).await;

    log.append("Sent alert notification to all connected clients");
    info!(
        entry = ?entry,
        tcp_delivered = tcp,
        udp_delivered = udp,
        alert = record.text(),
        "Alert broadcast"
    );
}

//! Local control channel.
//!
//! A co-located process (the power-outage worker, or `refuge notify`)
//! connects to the Unix socket, writes one message and disconnects. Every
//! control message makes the daemon tell all TCP clients to treat the
//! session as ended with `{"message":"disconnect"}`.
//!
//! Reading happens in a short-lived task so a silent control client cannot
//! stall the event loop.

use std::time::Duration;

use refuge_protocol::{DaemonMessage, MAX_MESSAGE_SIZE};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::eventlog::EventLog;
use crate::registry::ClientRegistry;

/// How long a control client has to deliver its message.
pub const CONTROL_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One message received on the control socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub text: String,
}

/// Reads one message from `stream` and forwards it to the loop.
pub fn spawn_control_reader(stream: UnixStream, messages: mpsc::Sender<ControlMessage>) {
    tokio::spawn(async move {
        let Some(text) = read_control_message(stream).await else {
            return;
        };
        if messages.send(ControlMessage { text }).await.is_err() {
            debug!("Event loop gone, control message dropped");
        }
    });
}

async fn read_control_message(mut stream: UnixStream) -> Option<String> {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    match timeout(CONTROL_READ_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(0)) => {
            debug!("Control client sent nothing");
            None
        }
        Ok(Ok(n)) => {
            let raw = buf.get(..n).unwrap_or_default();
            Some(
                String::from_utf8_lossy(raw)
                    .trim_end_matches(['\0', '\n'])
                    .to_string(),
            )
        }
        Ok(Err(e)) => {
            debug!(error = %e, "Control read failed");
            None
        }
        Err(_) => {
            debug!("Control client timed out");
            None
        }
    }
}

/// Logs a control message and broadcasts the disconnect notice to all TCP clients.
///
/// Returns the number of clients reached.
pub async fn handle_control(
    message: &ControlMessage,
    registry: &mut ClientRegistry,
    log: &EventLog,
) -> usize {
    log.append(&format!("Control message received: {}", message.text));

    let bytes = match DaemonMessage::disconnect().to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to encode disconnect notice");
            return 0;
        }
    };
    let delivered = registry.broadcast_tcp(&bytes).await;

    info!(
        text = %message.text,
        delivered,
        "Control message handled, disconnect broadcast"
    );
    delivered
}

//! Per-connection reader tasks.
//!
//! A reader task owns the read half of one TCP connection. It performs
//! one read of up to [`MAX_MESSAGE_SIZE`] bytes at a time and forwards the
//! bytes to the event loop as one message. It never touches shared state;
//! all handling happens in the loop task, in arrival order.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` in this module
//! - A closed event channel ends the task quietly

use refuge_protocol::MAX_MESSAGE_SIZE;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::registry::ClientId;

/// Why a connection stopped producing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its side
    Eof,

    /// Read failed
    Error(String),
}

/// Events forwarded from reader tasks to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// One read's worth of bytes
    Message { id: ClientId, payload: Vec<u8> },

    /// The connection can no longer be read
    Closed { id: ClientId, reason: CloseReason },
}

/// Spawns a reader task for `reader`, returning a handle to abort it.
pub fn spawn_reader<R>(id: ClientId, reader: R, events: mpsc::Sender<ClientEvent>) -> AbortHandle
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(read_loop(id, reader, events)).abort_handle()
}

async fn read_loop<R>(id: ClientId, mut reader: R, events: mpsc::Sender<ClientEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];

    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => ClientEvent::Closed {
                id,
                reason: CloseReason::Eof,
            },
            Ok(n) => ClientEvent::Message {
                id,
                payload: buf.get(..n).map(<[u8]>::to_vec).unwrap_or_default(),
            },
            Err(e) => ClientEvent::Closed {
                id,
                reason: CloseReason::Error(e.to_string()),
            },
        };

        let closed = matches!(event, ClientEvent::Closed { .. });
        if events.send(event).await.is_err() {
            trace!(client = %id, "Event loop gone, reader exiting");
            return;
        }
        if closed {
            return;
        }
    }
}

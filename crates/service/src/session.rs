//! Per-session socket tasks.
//!
//! Each accepted connection gets two tokio tasks: a reader that bridges
//! request frames into the service loop, and a writer that drains the
//! session's FIFO send queue with at most one in-flight write. Neither
//! task touches plugin state; every completion first checks the stopping
//! flag.

use crate::events::{ServiceEvent, SessionId};
use crossbeam_channel::Sender;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Upper bound on inbound frame payloads. Requests are a handful of
/// bytes; anything larger is a broken or hostile client.
const MAX_REQUEST_FRAME: usize = 64 * 1024;

/// Spawn the reader and writer tasks for an accepted socket and announce
/// the session to the loop.
pub(crate) fn spawn(
    id: SessionId,
    stream: TcpStream,
    events: Sender<ServiceEvent>,
    stopping: Arc<AtomicBool>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        warn!(session = id, error = %err, "failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();

    // The reader is gated on `registered` so no frame can precede the
    // SessionOpened event in the loop's channel.
    let (registered, gate) = oneshot::channel::<()>();
    let reader_events = events.clone();
    let reader_stopping = stopping.clone();
    let reader = tokio::spawn(async move {
        if gate.await.is_err() {
            return;
        }
        read_loop(id, read_half, reader_events, reader_stopping).await;
    });
    let _ = events.send(ServiceEvent::SessionOpened { id, outbound, reader });
    let _ = registered.send(());

    tokio::spawn(write_loop(id, write_half, outbound_rx, events, stopping));
}

async fn read_loop(
    id: SessionId,
    mut read_half: OwnedReadHalf,
    events: Sender<ServiceEvent>,
    stopping: Arc<AtomicBool>,
) {
    loop {
        if stopping.load(Ordering::Relaxed) {
            return;
        }
        let mut len_buf = [0u8; 4];
        match read_half.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(session = id, "peer closed connection");
                let _ = events.send(ServiceEvent::SessionClosed { id });
                return;
            }
            Err(err) => {
                let _ = events.send(fail(id, "read", err));
                return;
            }
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_REQUEST_FRAME {
            let _ = events.send(ServiceEvent::SessionFailed {
                id,
                operation: "read",
                error: format!("request frame of {len} bytes"),
            });
            return;
        }
        let mut payload = vec![0u8; len];
        if let Err(err) = read_half.read_exact(&mut payload).await {
            let _ = events.send(fail(id, "read", err));
            return;
        }
        let _ = events.send(ServiceEvent::SessionFrame { id, payload });
    }
}

async fn write_loop(
    id: SessionId,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: Sender<ServiceEvent>,
    stopping: Arc<AtomicBool>,
) {
    while let Some(frame) = outbound.recv().await {
        if stopping.load(Ordering::Relaxed) {
            return;
        }
        if let Err(err) = write_half.write_all(&frame).await {
            let _ = events.send(fail(id, "write", err));
            return;
        }
    }
    // Queue closed by the loop dropping the session: orderly close.
    let _ = write_half.shutdown().await;
}

fn fail(id: SessionId, operation: &'static str, err: io::Error) -> ServiceEvent {
    ServiceEvent::SessionFailed {
        id,
        operation,
        error: err.to_string(),
    }
}

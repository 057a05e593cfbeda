//! TCP listener and accept loop.

use crate::events::{ServiceEvent, SessionId};
use crate::session;
use crossbeam_channel::Sender;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info, warn};

/// Send/receive buffer size applied to the listening socket; accepted
/// sockets inherit it.
const SOCKET_BUFFER_SIZE: u32 = 1024 * 1024;

/// Delay before retrying accept after file-descriptor exhaustion.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bind the listen socket with `SO_REUSEADDR` and 1 MiB buffers.
pub(crate) fn bind(endpoint: SocketAddr) -> io::Result<TcpListener> {
    let socket = match endpoint {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.bind(endpoint)?;
    socket.listen(1024)
}

/// Accept connections until the listener fails or the service stops.
///
/// Running out of file descriptors only delays the next accept; other
/// accept errors end the loop (but not the process).
pub(crate) async fn run(
    listener: TcpListener,
    events: Sender<ServiceEvent>,
    stopping: Arc<AtomicBool>,
) {
    let mut next_session_id: SessionId = 0;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if stopping.load(Ordering::Relaxed) {
                    return;
                }
                info!(%peer, "incoming connection");
                let id = next_session_id;
                next_session_id += 1;
                session::spawn(id, stream, events.clone(), stopping.clone());
            }
            Err(err) if is_fd_exhaustion(&err) => {
                warn!(error = %err, "accept failed: out of file descriptors, retrying");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
            Err(err) => {
                error!(error = %err, "accept failed, stopping listener");
                return;
            }
        }
    }
}

// ENFILE (23) / EMFILE (24) on unix.
fn is_fd_exhaustion(error: &io::Error) -> bool {
    matches!(error.raw_os_error(), Some(23) | Some(24))
}

//! Events consumed by the service loop.

use scribe_chain::AcceptedBlock;
use scribe_types::TransactionTrace;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Identity of one session in the registry.
pub type SessionId = u64;

/// Everything that can happen to the service, in one ordered stream.
///
/// Ingestion signals and session activity share the channel, so the loop
/// thread is the only place plugin state is ever touched.
pub(crate) enum ServiceEvent {
    /// A transaction trace was applied by the chain engine.
    TransactionApplied(TransactionTrace),
    /// A block was accepted by the chain engine.
    BlockAccepted(AcceptedBlock),
    /// A connection was accepted and its tasks are running.
    SessionOpened {
        id: SessionId,
        /// The session's FIFO send queue; the writer task drains it with
        /// at most one in-flight write.
        outbound: UnboundedSender<Vec<u8>>,
        /// Reader task handle, aborted when the session is dropped.
        reader: JoinHandle<()>,
    },
    /// A request frame payload arrived (length prefix stripped).
    SessionFrame { id: SessionId, payload: Vec<u8> },
    /// A transport operation failed.
    SessionFailed {
        id: SessionId,
        operation: &'static str,
        error: String,
    },
    /// The peer closed the connection.
    SessionClosed { id: SessionId },
    /// Close every session and stop the loop.
    Shutdown,
}

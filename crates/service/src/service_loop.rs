//! The single-consumer service loop.
//!
//! Owns the block ingestor (and through it the three history logs) and
//! the session registry. Every mutation of that state happens here, on
//! one dedicated thread, in channel order: ingestion signals, decoded
//! request frames, and session lifecycle events interleave but never
//! overlap.

use crate::error::ServiceError;
use crate::events::{ServiceEvent, SessionId};
use crossbeam_channel::Receiver;
use scribe_chain::ChainPlugin;
use scribe_ingest::BlockIngestor;
use scribe_protocol::{
    encode_frame, BlockResult, FrameKind, SessionInput, SessionOutput, SessionProtocol,
    StateRequest, StateResult, StatusResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};

/// Shared slot for the acceptor task's abort handle. The plugin fills it
/// at startup; the loop takes it to halt accepting on a fatal error.
pub(crate) type AcceptorHandle = Arc<Mutex<Option<AbortHandle>>>;

struct SessionHandle {
    protocol: SessionProtocol,
    outbound: UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

/// The service's owning event loop.
pub(crate) struct ServiceLoop {
    chain: Arc<dyn ChainPlugin>,
    ingestor: BlockIngestor,
    sessions: HashMap<SessionId, SessionHandle>,
    stopping: Arc<AtomicBool>,
    acceptor: AcceptorHandle,
}

impl ServiceLoop {
    pub(crate) fn new(
        chain: Arc<dyn ChainPlugin>,
        ingestor: BlockIngestor,
        stopping: Arc<AtomicBool>,
        acceptor: AcceptorHandle,
    ) -> Self {
        Self {
            chain,
            ingestor,
            sessions: HashMap::new(),
            stopping,
            acceptor,
        }
    }

    /// Consume events until shutdown or a fatal ingestion error.
    pub(crate) fn run(mut self, events: Receiver<ServiceEvent>) -> Result<(), ServiceError> {
        info!("state history loop started");
        for event in events.iter() {
            if self.stopping.load(Ordering::Relaxed)
                && !matches!(event, ServiceEvent::Shutdown)
            {
                continue;
            }
            match event {
                ServiceEvent::TransactionApplied(trace) => {
                    self.ingestor.on_applied_transaction(trace);
                }
                ServiceEvent::BlockAccepted(block) => {
                    if let Err(err) = self.ingestor.on_accepted_block(&block, self.chain.state()) {
                        error!(
                            block_num = block.block_num,
                            error = %err,
                            "block ingestion failed, aborting state history"
                        );
                        self.halt();
                        return Err(err.into());
                    }
                }
                ServiceEvent::SessionOpened { id, outbound, reader } => {
                    scribe_metrics::record_session_opened();
                    self.sessions.insert(
                        id,
                        SessionHandle {
                            protocol: SessionProtocol::new(),
                            outbound,
                            reader,
                        },
                    );
                    self.drive(id, SessionInput::HandshakeComplete);
                }
                ServiceEvent::SessionFrame { id, payload } => {
                    self.drive(id, SessionInput::Frame(payload));
                }
                ServiceEvent::SessionFailed { id, operation, error } => {
                    self.drive(id, SessionInput::Failed { operation, error });
                }
                ServiceEvent::SessionClosed { id } => {
                    self.remove_session(id);
                }
                ServiceEvent::Shutdown => {
                    self.close_all_sessions();
                    break;
                }
            }
        }
        info!("state history loop stopped");
        Ok(())
    }

    /// Feed one input through a session's state machine and execute the
    /// outputs in order.
    fn drive(&mut self, id: SessionId, input: SessionInput) {
        let Some(handle) = self.sessions.get_mut(&id) else {
            return;
        };
        let outputs = handle.protocol.handle(input);
        for output in outputs {
            match output {
                SessionOutput::SendText(text) => {
                    self.send_frame(id, FrameKind::Text, text.as_bytes());
                }
                SessionOutput::SendBinary(body) => {
                    self.send_frame(id, FrameKind::Binary, &body);
                }
                SessionOutput::HandleRequest(request) => match self.execute(request) {
                    Ok(result) => self.drive(id, SessionInput::Response(result)),
                    Err(err) => {
                        error!(session = id, error = %err, "request handling failed");
                        self.drive(
                            id,
                            SessionInput::Failed {
                                operation: "request",
                                error: err.to_string(),
                            },
                        );
                    }
                },
                SessionOutput::Close => self.remove_session(id),
            }
        }
    }

    /// Serve one decoded request from the logs and the chain's read view.
    fn execute(&mut self, request: StateRequest) -> Result<StateResult, ServiceError> {
        match request {
            StateRequest::GetStatus => {
                let view = self.chain.view();
                let (state_begin_block, state_end_block) = self.ingestor.chain_state_range();
                Ok(StateResult::Status(StatusResult {
                    last_irreversible_block_num: view.last_irreversible_block_num(),
                    last_irreversible_block_id: view.last_irreversible_block_id(),
                    state_begin_block,
                    state_end_block,
                }))
            }
            StateRequest::GetBlock { block_num } => {
                let block = self.chain.view().fetch_block_by_number(block_num);
                let block_state = self.ingestor.block_state_log_mut().get_data(block_num)?;
                let traces = self.ingestor.trace_log_mut().get_data(block_num)?;
                let deltas = self.ingestor.chain_state_log_mut().get_data(block_num)?;
                Ok(StateResult::Block(BlockResult {
                    block_num,
                    block,
                    block_state,
                    traces,
                    deltas,
                }))
            }
        }
    }

    fn send_frame(&mut self, id: SessionId, kind: FrameKind, body: &[u8]) {
        let Some(handle) = self.sessions.get(&id) else {
            return;
        };
        if handle.outbound.send(encode_frame(kind, body)).is_err() {
            debug!(session = id, "send queue closed, dropping session");
            self.remove_session(id);
        }
    }

    fn remove_session(&mut self, id: SessionId) {
        if let Some(handle) = self.sessions.remove(&id) {
            // Dropping the outbound sender lets the writer task drain the
            // queue and shut the socket down.
            handle.reader.abort();
            scribe_metrics::record_session_closed();
            debug!(session = id, "session closed");
        }
    }

    fn close_all_sessions(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.remove_session(id);
        }
    }

    /// Stop the whole service after a fatal error: no new sockets, no
    /// further events, every open session closed.
    fn halt(&mut self) {
        self.stopping.store(true, Ordering::Relaxed);
        if let Some(handle) = self
            .acceptor
            .lock()
            .expect("acceptor handle lock poisoned")
            .take()
        {
            handle.abort();
        }
        self.close_all_sessions();
    }
}

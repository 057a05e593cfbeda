//! Session protocol state machine.
//!
//! Pure synchronous state machine for one client connection. Does NOT
//! touch sockets, logs, or the chain — the runner feeds it inputs and
//! executes the returned outputs in order.
//!
//! # Usage
//!
//! ```text
//! Runner ──► SessionProtocol::handle(SessionInput) ──► Vec<SessionOutput>
//! ```
//!
//! The runner appends every `Send*` output to the session's FIFO send
//! queue, so responses leave in the order their requests arrived.

use crate::abi::STATE_HISTORY_ABI;
use crate::messages::{StateRequest, StateResult};
use crate::wire::{parse_frame, FrameKind};
use serde::Serialize;
use tracing::{debug, warn};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepted, handshake not finished.
    Opening,
    /// ABI sent; serving requests.
    Active,
    /// Closed or closing; every further input is ignored.
    Closing,
}

impl SessionState {
    /// String form for metrics/logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Opening => "opening",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
        }
    }
}

/// Inputs to the session state machine.
#[derive(Debug)]
pub enum SessionInput {
    /// The transport handshake completed.
    HandshakeComplete,
    /// A frame payload arrived (kind byte plus body, length stripped).
    Frame(Vec<u8>),
    /// The service finished a request; its result is ready to send.
    Response(StateResult),
    /// A transport operation failed.
    Failed {
        operation: &'static str,
        error: String,
    },
}

/// Outputs from the session state machine.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionOutput {
    /// Send the ABI document as a text frame.
    SendText(&'static str),
    /// Send a binary frame.
    SendBinary(Vec<u8>),
    /// Execute a decoded request and feed the result back as
    /// [`SessionInput::Response`].
    HandleRequest(StateRequest),
    /// Tear the connection down and drop the session from the registry.
    Close,
}

/// Status snapshot for external APIs.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub abi_sent: bool,
    pub requests_handled: u64,
}

/// Per-connection request/response state machine.
pub struct SessionProtocol {
    state: SessionState,
    abi_sent: bool,
    requests_handled: u64,
}

impl Default for SessionProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProtocol {
    /// Create a session in the `Opening` state.
    pub fn new() -> Self {
        Self {
            state: SessionState::Opening,
            abi_sent: false,
            requests_handled: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Status snapshot.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            abi_sent: self.abi_sent,
            requests_handled: self.requests_handled,
        }
    }

    /// Process an input and return outputs for the runner to execute in
    /// order.
    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionOutput> {
        if self.state == SessionState::Closing {
            return vec![];
        }
        match input {
            SessionInput::HandshakeComplete => self.handle_handshake(),
            SessionInput::Frame(payload) => self.handle_frame(&payload),
            SessionInput::Response(result) => self.handle_response(result),
            SessionInput::Failed { operation, error } => {
                warn!(operation, error = %error, "session failed");
                self.close()
            }
        }
    }

    fn handle_handshake(&mut self) -> Vec<SessionOutput> {
        if self.state != SessionState::Opening {
            warn!("handshake completion on an active session");
            return self.close();
        }
        self.state = SessionState::Active;
        self.abi_sent = true;
        vec![SessionOutput::SendText(STATE_HISTORY_ABI)]
    }

    fn handle_frame(&mut self, payload: &[u8]) -> Vec<SessionOutput> {
        if self.state != SessionState::Active {
            warn!("request frame before handshake completion");
            return self.close();
        }
        let request = match parse_frame(payload) {
            Ok((FrameKind::Binary, body)) => StateRequest::unpack(body),
            Ok((FrameKind::Text, _)) => {
                warn!("unexpected text frame from client");
                return self.close();
            }
            Err(err) => Err(err),
        };
        match request {
            Ok(request) => {
                self.requests_handled += 1;
                scribe_metrics::record_request(request.kind());
                debug!(kind = request.kind(), "handling request");
                vec![SessionOutput::HandleRequest(request)]
            }
            Err(err) => {
                warn!(error = %err, "failed to decode request frame");
                self.close()
            }
        }
    }

    fn handle_response(&mut self, result: StateResult) -> Vec<SessionOutput> {
        if self.state != SessionState::Active {
            return self.close();
        }
        vec![SessionOutput::SendBinary(result.pack())]
    }

    fn close(&mut self) -> Vec<SessionOutput> {
        self.state = SessionState::Closing;
        vec![SessionOutput::Close]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::StatusResult;
    use crate::wire::encode_frame;
    use scribe_types::BlockId;

    fn request_frame(request: &StateRequest) -> Vec<u8> {
        // Strip the length prefix: the transport consumes it before the
        // state machine sees the payload.
        encode_frame(FrameKind::Binary, &request.pack())[4..].to_vec()
    }

    fn status_result() -> StateResult {
        StateResult::Status(StatusResult {
            last_irreversible_block_num: 1,
            last_irreversible_block_id: BlockId::from_bytes([1; 32]),
            state_begin_block: 0,
            state_end_block: 0,
        })
    }

    #[test]
    fn test_handshake_sends_abi_first() {
        let mut session = SessionProtocol::new();
        assert_eq!(session.state(), SessionState::Opening);

        let outputs = session.handle(SessionInput::HandshakeComplete);
        assert_eq!(outputs, vec![SessionOutput::SendText(STATE_HISTORY_ABI)]);
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.status().abi_sent);
    }

    #[test]
    fn test_request_decoded_and_counted() {
        let mut session = SessionProtocol::new();
        session.handle(SessionInput::HandshakeComplete);

        let outputs = session.handle(SessionInput::Frame(request_frame(
            &StateRequest::GetBlock { block_num: 5 },
        )));
        assert_eq!(
            outputs,
            vec![SessionOutput::HandleRequest(StateRequest::GetBlock { block_num: 5 })]
        );
        assert_eq!(session.status().requests_handled, 1);
    }

    #[test]
    fn test_response_sent_as_binary() {
        let mut session = SessionProtocol::new();
        session.handle(SessionInput::HandshakeComplete);

        let outputs = session.handle(SessionInput::Response(status_result()));
        assert_eq!(
            outputs,
            vec![SessionOutput::SendBinary(status_result().pack())]
        );
    }

    #[test]
    fn test_frame_before_handshake_closes() {
        let mut session = SessionProtocol::new();
        let outputs = session.handle(SessionInput::Frame(request_frame(&StateRequest::GetStatus)));
        assert_eq!(outputs, vec![SessionOutput::Close]);
        assert_eq!(session.state(), SessionState::Closing);
    }

    #[test]
    fn test_undecodable_frame_closes() {
        let mut session = SessionProtocol::new();
        session.handle(SessionInput::HandshakeComplete);

        let outputs = session.handle(SessionInput::Frame(vec![1, 0xff]));
        assert_eq!(outputs, vec![SessionOutput::Close]);
    }

    #[test]
    fn test_client_text_frame_closes() {
        let mut session = SessionProtocol::new();
        session.handle(SessionInput::HandshakeComplete);

        let frame = encode_frame(FrameKind::Text, b"not allowed")[4..].to_vec();
        let outputs = session.handle(SessionInput::Frame(frame));
        assert_eq!(outputs, vec![SessionOutput::Close]);
    }

    #[test]
    fn test_transport_failure_closes() {
        let mut session = SessionProtocol::new();
        session.handle(SessionInput::HandshakeComplete);

        let outputs = session.handle(SessionInput::Failed {
            operation: "read",
            error: "connection reset".into(),
        });
        assert_eq!(outputs, vec![SessionOutput::Close]);
    }

    #[test]
    fn test_inputs_after_closing_are_ignored() {
        let mut session = SessionProtocol::new();
        session.handle(SessionInput::Frame(vec![]));
        assert_eq!(session.state(), SessionState::Closing);

        assert!(session.handle(SessionInput::HandshakeComplete).is_empty());
        assert!(session
            .handle(SessionInput::Response(status_result()))
            .is_empty());
    }

    #[test]
    fn test_responses_follow_request_order() {
        let mut session = SessionProtocol::new();
        session.handle(SessionInput::HandshakeComplete);

        let first = session.handle(SessionInput::Frame(request_frame(&StateRequest::GetStatus)));
        let second = session.handle(SessionInput::Frame(request_frame(
            &StateRequest::GetBlock { block_num: 2 },
        )));
        assert!(matches!(
            first[0],
            SessionOutput::HandleRequest(StateRequest::GetStatus)
        ));
        assert!(matches!(
            second[0],
            SessionOutput::HandleRequest(StateRequest::GetBlock { block_num: 2 })
        ));
    }
}

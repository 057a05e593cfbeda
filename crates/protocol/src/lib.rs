//! Streaming session protocol for state-history clients.
//!
//! # Wire Format
//!
//! ```text
//! frame:  [length: u32 LE][kind: u8 (0 = text, 1 = binary)][body]
//! ```
//!
//! The first frame a session sends is the text ABI document; every frame
//! after it is binary. Client frames carry a packed [`StateRequest`],
//! server frames after the ABI carry a packed [`StateResult`].
//!
//! The session itself is a sans-IO state machine ([`SessionProtocol`]):
//! the runner feeds it handshake/frame/response inputs and executes the
//! send/close outputs, which keeps responses in request order.

mod abi;
mod messages;
mod session;
mod wire;

pub use abi::STATE_HISTORY_ABI;
pub use messages::{BlockResult, StateRequest, StateResult, StatusResult};
pub use session::{SessionInput, SessionOutput, SessionProtocol, SessionState, SessionStatus};
pub use wire::{encode_frame, parse_frame, FrameKind, FRAME_HEADER_SIZE};

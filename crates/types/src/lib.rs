//! Shared types for the state-history subsystem.
//!
//! Defines the identifiers, the on-disk history entry header, the packed
//! table-delta and transaction-trace shapes, and the little-endian binary
//! codec primitives every other crate builds on. Chain entities themselves
//! (accounts, permissions, rows) stay opaque byte blobs; only their
//! envelopes are defined here.

mod codec;
mod delta;
mod header;
mod ids;
mod trace;

pub use codec::{ByteReader, CodecError, put_bytes, put_str, put_u32, put_u64, put_varint};
pub use delta::{DeltaRow, TableDelta, TableTag};
pub use header::{HistoryHeader, IndexRecord, HEADER_SIZE, INDEX_RECORD_SIZE};
pub use ids::{BlockId, TransactionId};
pub use trace::TransactionTrace;

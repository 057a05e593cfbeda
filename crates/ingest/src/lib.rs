//! Block ingestion for the state-history subsystem.
//!
//! Sits between the chain engine's signals and the history logs: traces
//! are buffered per transaction as they are applied, and every accepted
//! block produces one entry in each of the three logs — block state,
//! traces, and chain-state deltas extracted from the database's undo
//! stack.

mod buffer;
mod extractor;
mod ingestor;

pub use buffer::TraceBuffer;
pub use extractor::{extract_deltas, ExtractError};
pub use ingestor::{BlockIngestor, IngestError};

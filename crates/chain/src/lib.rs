//! Chain-engine interface for the state-history subsystem.
//!
//! The chain execution engine is an external collaborator: it applies
//! transactions, accepts blocks, and owns the chain database and block
//! store. This crate names the seams the state-history subsystem reaches
//! it through — read views, per-table undo-frame access, and the two
//! lifecycle signals — and provides an in-memory implementation for tests
//! and simulation.

mod memory;
mod signal;
mod traits;

pub use memory::MemoryChain;
pub use signal::{Signal, SignalConnection};
pub use traits::{
    AcceptedBlock, ChainPlugin, ChainView, RowId, StateSource, TableRow, TableView, UndoFrame,
};

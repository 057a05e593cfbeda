//! Append-only block-indexed history log.
//!
//! One log is a pair of files: a data file of `header ∥ payload` entries
//! and a sidecar index of fixed-size records giving O(1) random access by
//! block number. Entries are contiguous and strictly increasing by one;
//! a chain reorganization truncates the tail before the replacement block
//! is appended.
//!
//! All I/O is synchronous blocking file I/O. Callers serialize access on
//! one thread; writes are small and happen once per accepted block.

mod history_log;

pub use history_log::{EntryReader, HistoryLog, LogError};

//! Metrics facade for the state-history subsystem.
//!
//! Provides a [`MetricsRecorder`] trait with domain-specific methods and
//! default no-op implementations. A global singleton recorder is accessed
//! via [`recorder()`], and convenience free functions delegate to it.
//!
//! # Usage
//!
//! Callers record metrics via free functions:
//! ```ignore
//! scribe_metrics::record_entry_written("trace_history", payload_len);
//! scribe_metrics::record_request("get_block");
//! ```
//!
//! At startup, an embedding application may install a backend with
//! [`install`]; without one, every call is a no-op.

use std::sync::OnceLock;

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── History logs ─────────────────────────────────────────────────

    /// Record an entry appended to a history log.
    fn record_entry_written(&self, log: &str, payload_bytes: usize) {}

    /// Record a reorg truncation, with the number of entries dropped.
    fn record_log_truncated(&self, log: &str, dropped_entries: u64) {}

    // ── Ingestion ────────────────────────────────────────────────────

    /// Record a fully ingested block.
    fn record_block_ingested(&self, block_num: u32) {}

    /// Record a trace admitted to the trace buffer.
    fn record_trace_buffered(&self) {}

    /// Record a transaction whose trace was missing at block time.
    fn record_missing_trace(&self) {}

    /// Record a chain-state extraction, with the number of table deltas.
    fn record_deltas_extracted(&self, tables: usize) {}

    // ── Sessions ─────────────────────────────────────────────────────

    /// Record an accepted client connection.
    fn record_session_opened(&self) {}

    /// Record a closed session.
    fn record_session_closed(&self) {}

    /// Record a handled request by kind (`"get_status"` / `"get_block"`).
    fn record_request(&self, kind: &str) {}
}

struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install a metrics backend. Returns `false` if one was already
/// installed (the first install wins).
pub fn install(recorder: Box<dyn MetricsRecorder>) -> bool {
    RECORDER.set(recorder).is_ok()
}

/// The installed recorder, or the no-op recorder.
pub fn recorder() -> &'static dyn MetricsRecorder {
    static NOOP: NoopRecorder = NoopRecorder;
    match RECORDER.get() {
        Some(recorder) => recorder.as_ref(),
        None => &NOOP,
    }
}

/// Record an entry appended to a history log.
pub fn record_entry_written(log: &str, payload_bytes: usize) {
    recorder().record_entry_written(log, payload_bytes);
}

/// Record a reorg truncation.
pub fn record_log_truncated(log: &str, dropped_entries: u64) {
    recorder().record_log_truncated(log, dropped_entries);
}

/// Record a fully ingested block.
pub fn record_block_ingested(block_num: u32) {
    recorder().record_block_ingested(block_num);
}

/// Record a trace admitted to the trace buffer.
pub fn record_trace_buffered() {
    recorder().record_trace_buffered();
}

/// Record a transaction whose trace was missing at block time.
pub fn record_missing_trace() {
    recorder().record_missing_trace();
}

/// Record a chain-state extraction.
pub fn record_deltas_extracted(tables: usize) {
    recorder().record_deltas_extracted(tables);
}

/// Record an accepted client connection.
pub fn record_session_opened() {
    recorder().record_session_opened();
}

/// Record a closed session.
pub fn record_session_closed() {
    recorder().record_session_closed();
}

/// Record a handled request by kind.
pub fn record_request(kind: &str) {
    recorder().record_request(kind);
}

//! Per-block transaction trace buffer.

use scribe_types::{TransactionId, TransactionTrace};
use std::collections::HashMap;
use tracing::debug;

/// Caches traces between `applied_transaction` and `accepted_block`.
///
/// Only traces carrying a receipt are admitted; the buffer is drained to
/// empty at every accepted block.
#[derive(Default)]
pub struct TraceBuffer {
    traces: HashMap<TransactionId, TransactionTrace>,
}

impl TraceBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a trace. Traces without receipts are discarded.
    pub fn record(&mut self, trace: TransactionTrace) {
        if !trace.has_receipt {
            debug!(id = %trace.id, "discarding receiptless trace");
            return;
        }
        scribe_metrics::record_trace_buffered();
        self.traces.insert(trace.id, trace);
    }

    /// Remove and return the trace for a transaction.
    pub fn take(&mut self, id: &TransactionId) -> Option<TransactionTrace> {
        self.traces.remove(id)
    }

    /// Drop every buffered trace.
    pub fn clear(&mut self) {
        self.traces.clear();
    }

    /// Number of buffered traces.
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

//! The accepted-block handler: three log entries per block.

use crate::buffer::TraceBuffer;
use crate::extractor::{extract_deltas, ExtractError};
use scribe_chain::{AcceptedBlock, StateSource};
use scribe_log::{HistoryLog, LogError};
use scribe_types::{HistoryHeader, TableDelta, TransactionTrace};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from block ingestion. Fatal: the caller aborts ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Writes one entry per accepted block into each of the three history
/// logs, keeping their ranges aligned.
///
/// All three writes share one `(block_num, block_id, previous_id)`
/// triple, so the per-log reorg truncation keeps the logs in lockstep.
pub struct BlockIngestor {
    block_state_log: HistoryLog,
    trace_log: HistoryLog,
    chain_state_log: HistoryLog,
    traces: TraceBuffer,
}

impl BlockIngestor {
    /// Build an ingestor over three opened logs.
    pub fn new(
        block_state_log: HistoryLog,
        trace_log: HistoryLog,
        chain_state_log: HistoryLog,
    ) -> Self {
        Self {
            block_state_log,
            trace_log,
            chain_state_log,
            traces: TraceBuffer::new(),
        }
    }

    /// Buffer a transaction trace until its block is accepted.
    pub fn on_applied_transaction(&mut self, trace: TransactionTrace) {
        self.traces.record(trace);
    }

    /// Persist one accepted block: block state, traces, chain-state
    /// deltas. The trace buffer is empty when this returns.
    pub fn on_accepted_block(
        &mut self,
        block: &AcceptedBlock,
        state: &dyn StateSource,
    ) -> Result<(), IngestError> {
        self.store_block_state(block)?;
        self.store_traces(block)?;
        self.store_chain_state(block, state)?;
        scribe_metrics::record_block_ingested(block.block_num);
        Ok(())
    }

    fn store_block_state(&mut self, block: &AcceptedBlock) -> Result<(), IngestError> {
        // Reserved slot: an empty inner payload keeps the three logs
        // advancing in lockstep until full snapshots are written here.
        let payload = size_prefixed(&[])?;
        self.block_state_log
            .write_entry(&entry_header(block, &payload), &payload)?;
        Ok(())
    }

    fn store_traces(&mut self, block: &AcceptedBlock) -> Result<(), IngestError> {
        let mut collected = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            match self.traces.take(tx) {
                Some(trace) => collected.push(trace),
                None => {
                    warn!(id = %tx, "missing trace for transaction");
                    scribe_metrics::record_missing_trace();
                }
            }
        }
        self.traces.clear();

        let payload = size_prefixed(&TransactionTrace::pack_vec(&collected))?;
        self.trace_log
            .write_entry(&entry_header(block, &payload), &payload)?;
        Ok(())
    }

    fn store_chain_state(
        &mut self,
        block: &AcceptedBlock,
        state: &dyn StateSource,
    ) -> Result<(), IngestError> {
        let fresh = self.chain_state_log.is_empty();
        if fresh {
            info!(block_num = block.block_num, "placing initial state in block");
        }
        let deltas = extract_deltas(state, fresh)?;
        scribe_metrics::record_deltas_extracted(deltas.len());

        let payload = size_prefixed(&TableDelta::pack_vec(&deltas))?;
        self.chain_state_log
            .write_entry(&entry_header(block, &payload), &payload)?;
        Ok(())
    }

    /// The block-state log.
    pub fn block_state_log_mut(&mut self) -> &mut HistoryLog {
        &mut self.block_state_log
    }

    /// The trace log.
    pub fn trace_log_mut(&mut self) -> &mut HistoryLog {
        &mut self.trace_log
    }

    /// The chain-state log.
    pub fn chain_state_log_mut(&mut self) -> &mut HistoryLog {
        &mut self.chain_state_log
    }

    /// The chain-state log's stored range, as reported by `get_status`.
    pub fn chain_state_range(&self) -> (u32, u32) {
        (
            self.chain_state_log.begin_block(),
            self.chain_state_log.end_block(),
        )
    }

    /// Number of currently buffered traces.
    pub fn buffered_traces(&self) -> usize {
        self.traces.len()
    }
}

fn entry_header(block: &AcceptedBlock, payload: &[u8]) -> HistoryHeader {
    HistoryHeader {
        block_num: block.block_num,
        block_id: block.block_id,
        previous_id: block.previous_id,
        payload_size: payload.len() as u64,
    }
}

/// Prefix `inner` with its `u32` length, enforcing the 4 GiB entry limit
/// before the length is narrowed.
fn size_prefixed(inner: &[u8]) -> Result<Vec<u8>, LogError> {
    if inner.len() as u64 > u32::MAX as u64 {
        return Err(LogError::PayloadTooLarge {
            size: inner.len() as u64,
        });
    }
    let mut payload = Vec::with_capacity(4 + inner.len());
    payload.extend_from_slice(&(inner.len() as u32).to_le_bytes());
    payload.extend_from_slice(inner);
    Ok(payload)
}

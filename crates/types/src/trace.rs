//! Transaction execution traces as buffered and packed by the trace log.

use crate::codec::{put_bytes, put_varint, ByteReader, CodecError};
use crate::ids::TransactionId;

/// One transaction's execution trace.
///
/// The trace body is an opaque serialized blob produced by the chain
/// engine. `has_receipt` distinguishes on-chain executions with a result
/// from speculative or failed ones; only receipted traces are retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionTrace {
    pub id: TransactionId,
    pub has_receipt: bool,
    pub payload: Vec<u8>,
}

impl TransactionTrace {
    /// Pack a trace vector: varint count, then per trace the 32-byte id and
    /// the length-prefixed body. The receipt flag is buffer-admission state
    /// and is not written.
    pub fn pack_vec(traces: &[TransactionTrace]) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, traces.len() as u64);
        for trace in traces {
            out.extend_from_slice(trace.id.as_bytes());
            put_bytes(&mut out, &trace.payload);
        }
        out
    }

    /// Unpack a trace vector. Unpacked traces are receipted by definition.
    pub fn unpack_vec(buf: &[u8]) -> Result<Vec<TransactionTrace>, CodecError> {
        let mut r = ByteReader::new(buf);
        let count = r.varint()?;
        let mut traces = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let id = TransactionId::from_bytes(r.array32()?);
            let payload = r.bytes()?.to_vec();
            traces.push(TransactionTrace { id, has_receipt: true, payload });
        }
        Ok(traces)
    }
}

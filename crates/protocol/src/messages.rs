//! Packed request and result messages.
//!
//! # Wire Format
//!
//! Each message is a one-byte variant tag followed by its fields in
//! little-endian order. `optional<bytes>` is a presence byte (`0` absent,
//! `1` present) followed, when present, by a varint length and the raw
//! bytes.

use scribe_types::{put_bytes, put_u32, ByteReader, BlockId, CodecError};

/// A client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRequest {
    /// tag 0: `get_status_request_v0`
    GetStatus,
    /// tag 1: `get_block_request_v0`
    GetBlock { block_num: u32 },
}

impl StateRequest {
    /// Request kind for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StateRequest::GetStatus => "get_status",
            StateRequest::GetBlock { .. } => "get_block",
        }
    }

    /// Pack to wire bytes.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            StateRequest::GetStatus => out.push(0),
            StateRequest::GetBlock { block_num } => {
                out.push(1);
                put_u32(&mut out, *block_num);
            }
        }
        out
    }

    /// Unpack from wire bytes. The whole buffer must be consumed.
    pub fn unpack(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(buf);
        let request = match r.u8()? {
            0 => StateRequest::GetStatus,
            1 => StateRequest::GetBlock { block_num: r.u32()? },
            tag => return Err(CodecError::UnknownTag(tag)),
        };
        if !r.is_empty() {
            return Err(CodecError::TrailingBytes(r.remaining()));
        }
        Ok(request)
    }
}

/// `get_status_result_v0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResult {
    pub last_irreversible_block_num: u32,
    pub last_irreversible_block_id: BlockId,
    pub state_begin_block: u32,
    pub state_end_block: u32,
}

/// `get_block_result_v0`. Absent fields mean the requested block is
/// outside the corresponding store's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResult {
    pub block_num: u32,
    pub block: Option<Vec<u8>>,
    pub block_state: Option<Vec<u8>>,
    pub traces: Option<Vec<u8>>,
    pub deltas: Option<Vec<u8>>,
}

/// A server result frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateResult {
    /// tag 0
    Status(StatusResult),
    /// tag 1
    Block(BlockResult),
}

impl StateResult {
    /// Pack to wire bytes.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            StateResult::Status(status) => {
                out.push(0);
                put_u32(&mut out, status.last_irreversible_block_num);
                out.extend_from_slice(status.last_irreversible_block_id.as_bytes());
                put_u32(&mut out, status.state_begin_block);
                put_u32(&mut out, status.state_end_block);
            }
            StateResult::Block(block) => {
                out.push(1);
                put_u32(&mut out, block.block_num);
                put_optional_bytes(&mut out, block.block.as_deref());
                put_optional_bytes(&mut out, block.block_state.as_deref());
                put_optional_bytes(&mut out, block.traces.as_deref());
                put_optional_bytes(&mut out, block.deltas.as_deref());
            }
        }
        out
    }

    /// Unpack from wire bytes. The whole buffer must be consumed.
    pub fn unpack(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = ByteReader::new(buf);
        let result = match r.u8()? {
            0 => StateResult::Status(StatusResult {
                last_irreversible_block_num: r.u32()?,
                last_irreversible_block_id: BlockId::from_bytes(r.array32()?),
                state_begin_block: r.u32()?,
                state_end_block: r.u32()?,
            }),
            1 => StateResult::Block(BlockResult {
                block_num: r.u32()?,
                block: read_optional_bytes(&mut r)?,
                block_state: read_optional_bytes(&mut r)?,
                traces: read_optional_bytes(&mut r)?,
                deltas: read_optional_bytes(&mut r)?,
            }),
            tag => return Err(CodecError::UnknownTag(tag)),
        };
        if !r.is_empty() {
            return Err(CodecError::TrailingBytes(r.remaining()));
        }
        Ok(result)
    }
}

fn put_optional_bytes(out: &mut Vec<u8>, value: Option<&[u8]>) {
    match value {
        Some(bytes) => {
            out.push(1);
            put_bytes(out, bytes);
        }
        None => out.push(0),
    }
}

fn read_optional_bytes(r: &mut ByteReader<'_>) -> Result<Option<Vec<u8>>, CodecError> {
    match r.u8()? {
        0 => Ok(None),
        1 => Ok(Some(r.bytes()?.to_vec())),
        tag => Err(CodecError::UnknownTag(tag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        for request in [StateRequest::GetStatus, StateRequest::GetBlock { block_num: 1234 }] {
            let packed = request.pack();
            assert_eq!(StateRequest::unpack(&packed).unwrap(), request);
        }
    }

    #[test]
    fn test_request_layout() {
        assert_eq!(StateRequest::GetStatus.pack(), vec![0]);
        let packed = StateRequest::GetBlock { block_num: 7 }.pack();
        assert_eq!(packed, vec![1, 7, 0, 0, 0]);
    }

    #[test]
    fn test_request_rejects_unknown_tag() {
        assert_eq!(StateRequest::unpack(&[9]), Err(CodecError::UnknownTag(9)));
    }

    #[test]
    fn test_request_rejects_trailing_bytes() {
        assert_eq!(
            StateRequest::unpack(&[0, 0]),
            Err(CodecError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_status_result_roundtrip() {
        let result = StateResult::Status(StatusResult {
            last_irreversible_block_num: 42,
            last_irreversible_block_id: BlockId::from_bytes([9; 32]),
            state_begin_block: 10,
            state_end_block: 43,
        });
        let packed = result.pack();
        assert_eq!(packed.len(), 1 + 4 + 32 + 4 + 4);
        assert_eq!(StateResult::unpack(&packed).unwrap(), result);
    }

    #[test]
    fn test_block_result_roundtrip() {
        let result = StateResult::Block(BlockResult {
            block_num: 7,
            block: Some(b"raw block".to_vec()),
            block_state: Some(vec![]),
            traces: None,
            deltas: Some(b"deltas".to_vec()),
        });
        let packed = result.pack();
        assert_eq!(StateResult::unpack(&packed).unwrap(), result);
    }

    #[test]
    fn test_optional_bytes_layout() {
        let mut out = Vec::new();
        put_optional_bytes(&mut out, None);
        put_optional_bytes(&mut out, Some(b"ab"));
        assert_eq!(out, vec![0, 1, 2, b'a', b'b']);
    }
}
